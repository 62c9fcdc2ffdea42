use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};

pub const CONTRAST_FACTOR: f32 = 1.5;

// 3x3 sharpen: centre 32, neighbours -2, scale 16
const SHARPEN_KERNEL: [f32; 9] = [
    -0.125, -0.125, -0.125, //
    -0.125, 2.0, -0.125, //
    -0.125, -0.125, -0.125,
];

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("could not encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decodes an upload, normalises it to RGB, optionally enhances it, and returns PNG bytes.
pub fn prepare(raw: &[u8], enhance: bool) -> Result<Vec<u8>, PrepareError> {
    let img = image::load_from_memory(raw).map_err(PrepareError::Decode)?;
    let mut rgb = img.to_rgb8();

    if enhance {
        adjust_contrast(&mut rgb, CONTRAST_FACTOR);
        rgb = DynamicImage::ImageRgb8(rgb)
            .filter3x3(&SHARPEN_KERNEL)
            .to_rgb8();
    }

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(PrepareError::Encode)?;
    Ok(out.into_inner())
}

/// Pushes every channel away from the image's mean luminance by `factor`.
pub fn adjust_contrast(img: &mut RgbImage, factor: f32) {
    let pixels = (img.width() as f64) * (img.height() as f64);
    if pixels == 0.0 {
        return;
    }

    let sum: f64 = img
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .sum();
    let mean = (sum / pixels).round() as f32;

    for p in img.pixels_mut() {
        for c in p.0.iter_mut() {
            let v = mean + factor * (*c as f32 - mean);
            *c = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}
