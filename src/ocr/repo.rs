use anyhow::Context;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewOcrRequest, OcrRequest};

pub async fn insert(db: &PgPool, req: &NewOcrRequest<'_>) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ocr_requests (id, user_id, language, preprocess, detail, result_text, image_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(req.id)
    .bind(req.user_id)
    .bind(req.language)
    .bind(req.preprocess)
    .bind(req.detail)
    .bind(req.result_text)
    .bind(req.image_key)
    .execute(db)
    .await
    .context("insert ocr request")?;
    Ok(())
}

/// Requests a user made strictly after `since`.
pub async fn count_by_user_since(
    db: &PgPool,
    user_id: Uuid,
    since: OffsetDateTime,
) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
          FROM ocr_requests
         WHERE user_id = $1 AND created_at > $2
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(db)
    .await
    .context("count ocr requests")?;
    Ok(n)
}

pub async fn list_by_user(db: &PgPool, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<OcrRequest>> {
    let rows = sqlx::query_as::<_, OcrRequest>(
        r#"
        SELECT id, language, preprocess, detail, result_text, image_key, created_at
          FROM ocr_requests
         WHERE user_id = $1
         ORDER BY created_at DESC
         LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("list ocr history")?;
    Ok(rows)
}

/// Object keys of every stored input belonging to the user.
pub async fn image_keys_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT image_key
          FROM ocr_requests
         WHERE user_id = $1 AND image_key IS NOT NULL
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list image keys by user")?;
    Ok(rows.into_iter().map(|(k,)| k).collect())
}
