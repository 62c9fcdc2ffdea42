use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime, Time};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserStats {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_premium: bool,
    pub is_admin: bool,
    pub is_active: bool,
    pub request_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DayCount {
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LanguageCount {
    pub language: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserActivity {
    pub username: String,
    pub requests: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopUser {
    pub username: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub premium_users: i64,
    pub total_requests: i64,
    pub requests_today: i64,
    pub recent_users: Vec<UserStats>,
    pub requests_by_day: Vec<DayCount>,
    pub language_distribution: Vec<LanguageCount>,
    pub user_activity: Vec<UserActivity>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}
fn default_page() -> i64 { 1 }
fn default_limit() -> i64 { 10 }

#[derive(Debug, Serialize)]
pub struct UsersPage {
    pub users: Vec<UserStats>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminUserUpdate {
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub is_premium: Option<bool>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AdminUserOut {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_premium: bool,
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<crate::auth::repo_types::User> for AdminUserOut {
    fn from(u: crate::auth::repo_types::User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            is_active: u.is_active,
            is_premium: u.is_premium,
            is_admin: u.is_admin,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl DateFilter {
    /// Lower bound (inclusive) for `created_at`, or `None` for no bound.
    pub fn start(self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        match self {
            DateFilter::All => None,
            DateFilter::Today => Some(start_of_day(now)),
            DateFilter::Week => Some(now - Duration::days(7)),
            DateFilter::Month => Some(now - Duration::days(30)),
        }
    }
}

pub fn start_of_day(t: OffsetDateTime) -> OffsetDateTime {
    t.replace_time(Time::MIDNIGHT)
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub date_filter: Option<DateFilter>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OcrRequestInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub language: String,
    pub preprocess: bool,
    pub detail: bool,
    pub result_text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct OcrStatistics {
    pub total_requests: i64,
    pub requests_today: i64,
    pub requests_by_day: Vec<DayCount>,
    pub top_users: Vec<TopUser>,
    pub language_distribution: Vec<LanguageCount>,
    pub requests: Vec<OcrRequestInfo>,
    pub total_pages: i64,
}
