use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use super::tsv;
use crate::config::OcrConfig;

/// One recognised line of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRegion {
    /// Four corners, clockwise from top-left, in pixels.
    pub bbox: Vec<[f64; 2]>,
    pub text: String,
    /// 0.0..=1.0
    pub confidence: f64,
}

/// Seam to the external recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Shown to clients as part of `model_used`.
    fn name(&self) -> &'static str;

    /// Recognises a PNG-encoded image. `languages` are short codes (`en`, `ru`) in priority order.
    async fn recognize(&self, png: Bytes, languages: &[&str]) -> anyhow::Result<Vec<TextRegion>>;
}

/// Drives the `tesseract` CLI with TSV output.
pub struct TesseractEngine {
    cmd: String,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(cmd: impl Into<String>, timeout: Duration) -> Self {
        Self {
            cmd: cmd.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &OcrConfig) -> Self {
        Self::new(cfg.tesseract_cmd.clone(), Duration::from_secs(cfg.timeout_secs))
    }

    /// Fails early at startup if the binary is missing.
    pub async fn probe(&self) -> anyhow::Result<String> {
        let out = Command::new(&self.cmd)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawn {} --version", self.cmd))?;
        // older builds print the version to stderr
        let text = if out.stdout.is_empty() { out.stderr } else { out.stdout };
        Ok(String::from_utf8_lossy(&text)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string())
    }
}

pub fn tesseract_lang(code: &str) -> &str {
    match code {
        "en" => "eng",
        "ru" => "rus",
        other => other,
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "Tesseract"
    }

    async fn recognize(&self, png: Bytes, languages: &[&str]) -> anyhow::Result<Vec<TextRegion>> {
        let input = tempfile::Builder::new()
            .prefix("ocr-")
            .suffix(".png")
            .tempfile()
            .context("create temp input")?;
        tokio::fs::write(input.path(), &png)
            .await
            .context("write temp input")?;

        let lang = languages
            .iter()
            .map(|c| tesseract_lang(c))
            .collect::<Vec<_>>()
            .join("+");

        let mut cmd = Command::new(&self.cmd);
        cmd.arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&lang)
            .arg("tsv")
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .with_context(|| format!("tesseract timed out after {:?}", self.timeout))?
            .with_context(|| format!("spawn {}", self.cmd))?;

        if !output.status.success() {
            anyhow::bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let regions = tsv::parse_regions(&String::from_utf8_lossy(&output.stdout));
        debug!(lang = %lang, regions = regions.len(), "tesseract finished");
        Ok(regions)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Returns canned regions regardless of input.
    pub struct FakeEngine {
        pub regions: Vec<TextRegion>,
    }

    impl FakeEngine {
        pub fn with_lines(lines: &[&str]) -> Self {
            let regions = lines
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let y = (i * 20) as f64;
                    TextRegion {
                        bbox: vec![[0.0, y], [100.0, y], [100.0, y + 18.0], [0.0, y + 18.0]],
                        text: t.to_string(),
                        confidence: 0.9,
                    }
                })
                .collect();
            Self { regions }
        }
    }

    #[async_trait]
    impl OcrEngine for FakeEngine {
        fn name(&self) -> &'static str {
            "Fake"
        }

        async fn recognize(&self, _png: Bytes, _languages: &[&str]) -> anyhow::Result<Vec<TextRegion>> {
            Ok(self.regions.clone())
        }
    }
}
