use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Lifetime of the links handed out in history responses.
pub const PRESIGN_TTL_SECS: u64 = 10 * 60;

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

pub fn input_key(user_id: Uuid, request_id: Uuid, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("ocr/{}/{}.{}", user_id, request_id, ext)
}

/// Uploads the original image of a request and returns its object key.
pub async fn store_input(
    st: &AppState,
    user_id: Uuid,
    request_id: Uuid,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<String> {
    let key = input_key(user_id, request_id, content_type);
    st.storage
        .save(&key, body, content_type)
        .await
        .with_context(|| format!("archive {}", key))?;
    Ok(key)
}

/// Presigns a key, degrading to `None` when storage is unreachable.
pub async fn presign_input(st: &AppState, key: Option<&str>) -> Option<String> {
    let key = key?;
    match st.storage.link(key, Duration::from_secs(PRESIGN_TTL_SECS)).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, key, "presign failed");
            None
        }
    }
}

/// Best-effort removal; returns how many objects were deleted.
pub async fn delete_inputs(st: &AppState, keys: &[String]) -> usize {
    let mut deleted = 0;
    for k in keys {
        match st.storage.remove(k).await {
            Ok(()) => deleted += 1,
            Err(e) => warn!(error = %e, key = %k, "stored input not removed"),
        }
    }
    deleted
}
