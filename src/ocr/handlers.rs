use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ExtractQuery, HistoryItem, HistoryQuery, OcrResult},
    services::{self, RawOptions, Upload},
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    extract::{ApiMultipart, ApiQuery},
    settings,
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/ocr-history", get(get_history))
}

pub fn write_routes(max_upload_mb: usize) -> Router<AppState> {
    Router::new()
        .route("/extract-text", post(extract_text))
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
}

/// POST /extract-text (multipart)
/// Field `file` is required; `language`, `preprocess` and `detail` may be form fields or query params.
#[instrument(skip_all)]
pub async fn extract_text(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(q): ApiQuery<ExtractQuery>,
    ApiMultipart(mut mp): ApiMultipart,
) -> AppResult<Json<OcrResult>> {
    let settings = settings::load(&state.db).await?;
    services::ensure_available(&settings, &user)?;

    let mut upload: Option<Upload> = None;
    let mut form = RawOptions::default();

    // an over-limit body surfaces here as a 413 multipart error
    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let body = field.bytes().await?;
                upload = Some(Upload { body, content_type });
            }
            "language" => form.language = Some(field.text().await?),
            "preprocess" => form.preprocess = Some(field.text().await?),
            "detail" => form.detail = Some(field.text().await?),
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::bad_request("Field 'file' is required"))?;

    let query = RawOptions {
        language: q.language,
        preprocess: q.preprocess,
        detail: q.detail,
    };
    let result =
        services::extract_text(&state, &user, &settings, upload, query.overridden_by(form)).await?;
    Ok(Json(result))
}

#[instrument(skip_all)]
pub async fn get_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(q): ApiQuery<HistoryQuery>,
) -> AppResult<Json<Vec<HistoryItem>>> {
    let items = services::history(&state, &user, q.limit).await?;
    Ok(Json(items))
}
