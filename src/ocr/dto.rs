use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::engine::TextRegion;

/// Language selection accepted by `/extract-text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    Ru,
    En,
    RuEn,
    EnRu,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
            Language::RuEn => "ru+en",
            Language::EnRu => "en+ru",
        }
    }

    /// Engine languages in priority order.
    pub fn codes(self) -> &'static [&'static str] {
        match self {
            Language::Ru => &["ru"],
            Language::En => &["en"],
            Language::RuEn => &["ru", "en"],
            Language::EnRu => &["en", "ru"],
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // '+' decodes to a space in query strings
        let norm: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == ',' { '+' } else { c })
            .collect();
        match norm.as_str() {
            "ru" => Ok(Language::Ru),
            "en" => Ok(Language::En),
            "ru+en" => Ok(Language::RuEn),
            "en+ru" => Ok(Language::EnRu),
            other => Err(format!(
                "Unsupported language '{}'. Supported: ru, en, ru+en, en+ru",
                other
            )),
        }
    }
}

impl TryFrom<String> for Language {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Language> for String {
    fn from(l: Language) -> Self {
        l.as_str().to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional knobs on the query string; multipart text fields override them.
/// Flags stay raw here so both sources accept the same spellings (`true`, `1`, `yes`...).
#[derive(Debug, Default, Deserialize)]
pub struct ExtractQuery {
    pub language: Option<String>,
    pub preprocess: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OcrResult {
    pub text: String,
    pub model_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<TextRegion>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}
fn default_history_limit() -> i64 { 30 }

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub id: Uuid,
    pub language: String,
    pub preprocess: bool,
    pub detail: bool,
    pub result_text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}
