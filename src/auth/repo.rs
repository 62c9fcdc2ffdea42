use anyhow::Context;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{RefreshTokenRow, User};

const USER_COLUMNS: &str =
    "id, email, username, password_hash, is_active, is_premium, is_admin, created_at";

/// True when the error chain bottoms out in a Postgres unique violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => db.is_unique_violation(),
        _ => false,
    }
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(db)
            .await
            .context("find user by username")?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    pub async fn create(
        db: &PgPool,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let sql = format!(
            "INSERT INTO users (email, username, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        // no .context() here: callers inspect the sqlx error for unique violations
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(username)
            .bind(password_hash)
            .fetch_one(db)
            .await?;
        Ok(user)
    }
}

impl RefreshTokenRow {
    pub async fn insert(
        db: &PgPool,
        jti: Uuid,
        user_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(db)
        .await
        .context("insert refresh token")?;
        Ok(())
    }

    /// Atomically revokes an active token; `None` if it was unknown, expired or already revoked.
    pub async fn consume(db: &PgPool, jti: Uuid) -> anyhow::Result<Option<RefreshTokenRow>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            UPDATE refresh_tokens
               SET revoked = TRUE
             WHERE jti = $1
               AND revoked = FALSE
               AND expires_at > now()
            RETURNING jti, user_id, expires_at
            "#,
        )
        .bind(jti)
        .fetch_optional(db)
        .await
        .context("consume refresh token")?;
        Ok(row)
    }

    pub async fn purge_expired(db: &PgPool) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= now() OR revoked")
            .execute(db)
            .await
            .context("purge refresh tokens")?;
        Ok(res.rows_affected())
    }
}
