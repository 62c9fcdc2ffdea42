use anyhow::Context;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{DayCount, LanguageCount, OcrRequestInfo, TopUser, UserActivity, UserStats};
use crate::auth::repo_types::User;

pub async fn count_users(db: &PgPool, premium_only: bool) -> anyhow::Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE ($1 = FALSE OR is_premium)")
            .bind(premium_only)
            .fetch_one(db)
            .await
            .context("count users")?;
    Ok(n)
}

/// Requests overall, optionally bounded below by `since` and narrowed to `language`.
pub async fn count_requests(
    db: &PgPool,
    since: Option<OffsetDateTime>,
    language: Option<&str>,
) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
          FROM ocr_requests
         WHERE ($1::timestamptz IS NULL OR created_at >= $1)
           AND ($2::text IS NULL OR language = $2)
        "#,
    )
    .bind(since)
    .bind(language)
    .fetch_one(db)
    .await
    .context("count requests")?;
    Ok(n)
}

/// Users newest first, each with their lifetime request count.
pub async fn list_user_stats(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<UserStats>> {
    let rows = sqlx::query_as::<_, UserStats>(
        r#"
        SELECT u.id, u.username, u.email, u.created_at, u.is_premium, u.is_admin, u.is_active,
               COUNT(r.id) AS request_count
          FROM users u
          LEFT JOIN ocr_requests r ON r.user_id = u.id
         GROUP BY u.id
         ORDER BY u.created_at DESC
         LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list user stats")?;
    Ok(rows)
}

pub async fn requests_by_day(db: &PgPool, since: OffsetDateTime) -> anyhow::Result<Vec<DayCount>> {
    let rows = sqlx::query_as::<_, DayCount>(
        r#"
        SELECT date_trunc('day', created_at, 'UTC') AS date, COUNT(*) AS count
          FROM ocr_requests
         WHERE created_at >= $1
         GROUP BY 1
         ORDER BY 1
        "#,
    )
    .bind(since)
    .fetch_all(db)
    .await
    .context("requests by day")?;
    Ok(rows)
}

pub async fn language_distribution(db: &PgPool) -> anyhow::Result<Vec<LanguageCount>> {
    let rows = sqlx::query_as::<_, LanguageCount>(
        r#"
        SELECT language, COUNT(*) AS count
          FROM ocr_requests
         GROUP BY language
         ORDER BY count DESC, language
        "#,
    )
    .fetch_all(db)
    .await
    .context("language distribution")?;
    Ok(rows)
}

pub async fn top_users(db: &PgPool, limit: i64) -> anyhow::Result<Vec<TopUser>> {
    let rows = sqlx::query_as::<_, TopUser>(
        r#"
        SELECT u.username, COUNT(*) AS count
          FROM ocr_requests r
          JOIN users u ON u.id = r.user_id
         GROUP BY u.id, u.username
         ORDER BY count DESC, u.username
         LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await
    .context("top users")?;
    Ok(rows)
}

pub async fn user_activity(db: &PgPool, limit: i64) -> anyhow::Result<Vec<UserActivity>> {
    Ok(top_users(db, limit)
        .await?
        .into_iter()
        .map(|t| UserActivity {
            username: t.username,
            requests: t.count,
        })
        .collect())
}

pub async fn list_requests(
    db: &PgPool,
    since: Option<OffsetDateTime>,
    language: Option<&str>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<OcrRequestInfo>> {
    let rows = sqlx::query_as::<_, OcrRequestInfo>(
        r#"
        SELECT r.id, r.user_id, u.username, r.language, r.preprocess, r.detail,
               r.result_text, r.created_at
          FROM ocr_requests r
          JOIN users u ON u.id = r.user_id
         WHERE ($1::timestamptz IS NULL OR r.created_at >= $1)
           AND ($2::text IS NULL OR r.language = $2)
         ORDER BY r.created_at DESC
         LIMIT $3 OFFSET $4
        "#,
    )
    .bind(since)
    .bind(language)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list requests")?;
    Ok(rows)
}

pub async fn email_taken_by_other(db: &PgPool, email: &str, user_id: Uuid) -> anyhow::Result<bool> {
    let (taken,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND id <> $2)")
            .bind(email)
            .bind(user_id)
            .fetch_one(db)
            .await
            .context("check email")?;
    Ok(taken)
}

/// Applies only the fields that are `Some`; returns the updated row.
pub async fn update_user(
    db: &PgPool,
    user_id: Uuid,
    email: Option<&str>,
    is_active: Option<bool>,
    is_premium: Option<bool>,
    is_admin: Option<bool>,
) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
           SET email      = COALESCE($2, email),
               is_active  = COALESCE($3, is_active),
               is_premium = COALESCE($4, is_premium),
               is_admin   = COALESCE($5, is_admin)
         WHERE id = $1
        RETURNING id, email, username, password_hash, is_active, is_premium, is_admin, created_at
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(is_active)
    .bind(is_premium)
    .bind(is_admin)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Refresh tokens and OCR records go with the user through `ON DELETE CASCADE`.
pub async fn delete_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(db)
        .await
        .context("delete user")?;
    Ok(res.rows_affected() > 0)
}
