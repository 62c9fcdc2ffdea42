use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct OcrRequest {
    pub id: Uuid,
    pub language: String,
    pub preprocess: bool,
    pub detail: bool,
    pub result_text: String,
    pub image_key: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Insert payload; `id` is chosen up front so the stored image key can embed it.
#[derive(Debug, Clone)]
pub struct NewOcrRequest<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub language: &'a str,
    pub preprocess: bool,
    pub detail: bool,
    pub result_text: &'a str,
    pub image_key: Option<&'a str>,
}
