use anyhow::Context;
use bytes::Bytes;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{HistoryItem, Language, OcrResult},
    preprocess::{self, PrepareError},
    repo,
    repo_types::NewOcrRequest,
};
use crate::{
    auth::repo_types::User,
    error::{AppError, AppResult},
    images::services as images,
    settings::SystemSettings,
    state::AppState,
};

pub const ALLOWED_IMAGE_FORMATS: [&str; 3] = ["image/png", "image/jpeg", "image/jpg"];
pub const MAX_HISTORY_LIMIT: i64 = 100;

pub struct Upload {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub language: Language,
    pub preprocess: bool,
    pub detail: bool,
}

/// Raw knobs as they arrive from the query string or the form; `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct RawOptions {
    pub language: Option<String>,
    pub preprocess: Option<String>,
    pub detail: Option<String>,
}

impl RawOptions {
    /// Fields set in `other` win.
    pub fn overridden_by(self, other: RawOptions) -> RawOptions {
        RawOptions {
            language: other.language.or(self.language),
            preprocess: other.preprocess.or(self.preprocess),
            detail: other.detail.or(self.detail),
        }
    }

    pub fn resolve(self, settings: &SystemSettings) -> AppResult<ExtractOptions> {
        let language = match self.language.as_deref().map(str::trim) {
            None | Some("") => settings.default_language(),
            Some(l) => l.parse().map_err(AppError::BadRequest)?,
        };
        let preprocess = match self.preprocess {
            None => settings.preprocess_by_default,
            Some(v) => parse_flag("preprocess", &v)?,
        };
        let detail = match self.detail {
            None => false,
            Some(v) => parse_flag("detail", &v)?,
        };
        Ok(ExtractOptions {
            language,
            preprocess,
            detail,
        })
    }
}

fn parse_flag(name: &str, raw: &str) -> AppResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::BadRequest(format!(
            "Invalid value for '{}': expected a boolean",
            name
        ))),
    }
}

/// Maintenance mode locks everyone but admins out of extraction.
pub fn ensure_available(settings: &SystemSettings, user: &User) -> AppResult<()> {
    if settings.maintenance_mode && !user.is_admin {
        return Err(AppError::Unavailable(
            "Service is under maintenance, try again later".into(),
        ));
    }
    Ok(())
}

pub fn check_quota(used_last_day: i64, limit: i32, is_premium: bool) -> AppResult<()> {
    if !is_premium && used_last_day >= i64::from(limit) {
        return Err(AppError::TooManyRequests(
            "Request limit exceeded. Upgrade to Premium to remove the limit.".into(),
        ));
    }
    Ok(())
}

pub fn check_upload(upload: &Upload, settings: &SystemSettings) -> AppResult<()> {
    if !ALLOWED_IMAGE_FORMATS.contains(&upload.content_type.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Unsupported file format. Supported formats: {}",
            ALLOWED_IMAGE_FORMATS.join(", ")
        )));
    }
    if upload.body.is_empty() {
        return Err(AppError::bad_request("Uploaded file is empty"));
    }
    if upload.body.len() > settings.max_file_bytes() {
        return Err(AppError::PayloadTooLarge(format!(
            "File exceeds the {} MiB limit",
            settings.max_file_size
        )));
    }
    Ok(())
}

/// Free users never see more than `free_cap` rows; nobody sees more than 100.
pub fn effective_history_limit(requested: i64, is_premium: bool, free_cap: i64) -> i64 {
    let limit = requested.clamp(1, MAX_HISTORY_LIMIT);
    if is_premium {
        limit
    } else {
        limit.min(free_cap.max(1))
    }
}

pub fn model_label(engine: &str, language: Language) -> String {
    format!("{} ({})", engine, language.codes().join(","))
}

pub async fn extract_text(
    st: &AppState,
    user: &User,
    settings: &SystemSettings,
    upload: Upload,
    raw: RawOptions,
) -> AppResult<OcrResult> {
    ensure_available(settings, user)?;
    let opts = raw.resolve(settings)?;

    let day_ago = OffsetDateTime::now_utc() - TimeDuration::days(1);
    let used = repo::count_by_user_since(&st.db, user.id, day_ago).await?;
    check_quota(used, settings.request_limit, user.is_premium)?;

    check_upload(&upload, settings)?;

    let raw = upload.body.clone();
    let png = tokio::task::spawn_blocking(move || preprocess::prepare(&raw, opts.preprocess))
        .await
        .context("preprocess task")?
        .map_err(|e| match e {
            PrepareError::Decode(_) => AppError::BadRequest(e.to_string()),
            PrepareError::Encode(_) => AppError::Internal(e.into()),
        })?;

    let codes = opts.language.codes();
    let regions = st
        .ocr
        .recognize(Bytes::from(png), codes)
        .await
        .context("ocr recognize")?;

    let text = regions
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let request_id = Uuid::new_v4();
    let image_key = match images::store_input(
        st,
        user.id,
        request_id,
        upload.body,
        &upload.content_type,
    )
    .await
    {
        Ok(k) => Some(k),
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "input image not archived");
            None
        }
    };

    repo::insert(
        &st.db,
        &NewOcrRequest {
            id: request_id,
            user_id: user.id,
            language: opts.language.as_str(),
            preprocess: opts.preprocess,
            detail: opts.detail,
            result_text: &text,
            image_key: image_key.as_deref(),
        },
    )
    .await?;

    info!(
        user_id = %user.id,
        request_id = %request_id,
        language = %opts.language,
        regions = regions.len(),
        "text extracted"
    );

    Ok(OcrResult {
        text,
        model_used: model_label(st.ocr.name(), opts.language),
        regions: opts.detail.then_some(regions),
    })
}

pub async fn history(st: &AppState, user: &User, requested: i64) -> AppResult<Vec<HistoryItem>> {
    let limit = effective_history_limit(
        requested,
        user.is_premium,
        st.config.limits.history_limit,
    );
    let rows = repo::list_by_user(&st.db, user.id, limit).await?;

    let mut items = Vec::with_capacity(rows.len());
    for r in rows {
        let image_url = images::presign_input(st, r.image_key.as_deref()).await;
        items.push(HistoryItem {
            id: r.id,
            language: r.language,
            preprocess: r.preprocess,
            detail: r.detail,
            result_text: r.result_text,
            created_at: r.created_at,
            image_url,
        });
    }
    Ok(items)
}
