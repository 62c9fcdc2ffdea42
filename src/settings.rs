//! Runtime-tunable service settings, stored as a single row and edited from the admin panel.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::ocr::dto::Language;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SystemSettings {
    /// Daily extraction quota for free-tier users.
    pub request_limit: i32,
    pub default_language: String,
    pub preprocess_by_default: bool,
    pub admin_email: String,
    pub maintenance_mode: bool,
    /// Upload size limit in MiB.
    pub max_file_size: i32,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            request_limit: 10,
            default_language: Language::RuEn.as_str().to_string(),
            preprocess_by_default: true,
            admin_email: "admin@example.com".into(),
            maintenance_mode: false,
            max_file_size: 5,
        }
    }
}

impl SystemSettings {
    pub fn default_language(&self) -> Language {
        self.default_language.parse().unwrap_or(Language::RuEn)
    }

    pub fn max_file_bytes(&self) -> usize {
        (self.max_file_size.max(0) as usize) * 1024 * 1024
    }

    /// Checks an admin-submitted update; `upload_cap_mb` is the hard body limit of the server.
    pub fn validate(&mut self, upload_cap_mb: usize) -> Result<(), String> {
        if self.request_limit < 0 {
            return Err("request_limit must not be negative".into());
        }
        if self.max_file_size < 1 || self.max_file_size as usize > upload_cap_mb {
            return Err(format!("max_file_size must be between 1 and {} MiB", upload_cap_mb));
        }
        let lang: Language = self.default_language.parse()?;
        self.default_language = lang.as_str().to_string();
        self.admin_email = self.admin_email.trim().to_string();
        Ok(())
    }
}

const COLUMNS: &str =
    "request_limit, default_language, preprocess_by_default, admin_email, maintenance_mode, max_file_size";

/// Reads the settings row, seeding it with defaults on first use.
pub async fn load(db: &PgPool) -> anyhow::Result<SystemSettings> {
    let sql = format!("SELECT {COLUMNS} FROM system_settings WHERE id = 1");
    if let Some(s) = sqlx::query_as::<_, SystemSettings>(&sql)
        .fetch_optional(db)
        .await
        .context("load settings")?
    {
        return Ok(s);
    }

    let defaults = SystemSettings::default();
    let sql = format!(
        "INSERT INTO system_settings (id, {COLUMNS}) VALUES (1, $1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id RETURNING {COLUMNS}"
    );
    // a concurrent seed wins via the no-op update and its row is returned
    let seeded = bind_all(sqlx::query_as::<_, SystemSettings>(&sql), &defaults)
        .fetch_one(db)
        .await
        .context("seed settings")?;
    Ok(seeded)
}

pub async fn save(db: &PgPool, s: &SystemSettings) -> anyhow::Result<SystemSettings> {
    let sql = format!(
        "INSERT INTO system_settings (id, {COLUMNS}) VALUES (1, $1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET \
           request_limit = EXCLUDED.request_limit, \
           default_language = EXCLUDED.default_language, \
           preprocess_by_default = EXCLUDED.preprocess_by_default, \
           admin_email = EXCLUDED.admin_email, \
           maintenance_mode = EXCLUDED.maintenance_mode, \
           max_file_size = EXCLUDED.max_file_size \
         RETURNING {COLUMNS}"
    );
    let saved = bind_all(sqlx::query_as::<_, SystemSettings>(&sql), s)
        .fetch_one(db)
        .await
        .context("save settings")?;
    Ok(saved)
}

fn bind_all<'q>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, SystemSettings, sqlx::postgres::PgArguments>,
    s: &'q SystemSettings,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, SystemSettings, sqlx::postgres::PgArguments> {
    q.bind(s.request_limit)
        .bind(&s.default_language)
        .bind(s.preprocess_by_default)
        .bind(&s.admin_email)
        .bind(s.maintenance_mode)
        .bind(s.max_file_size)
}
