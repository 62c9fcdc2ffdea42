use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{AdminUserOut, AdminUserUpdate, DashboardStats, OcrStatistics, PageQuery, StatsQuery, UsersPage},
    services,
};
use crate::{
    auth::{dto::Detail, extractors::AdminUser},
    error::AppResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    settings::SystemSettings,
    state::AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", put(update_user).delete(delete_user))
        .route("/admin/ocr-stats", get(ocr_stats))
        .route("/admin/settings", get(get_settings).put(update_settings))
}

#[instrument(skip_all)]
pub async fn dashboard(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<DashboardStats>> {
    Ok(Json(services::dashboard(&state).await?))
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> AppResult<Json<UsersPage>> {
    Ok(Json(services::list_users(&state, q.page, q.limit).await?))
}

#[instrument(skip(state, admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AdminUserUpdate>,
) -> AppResult<Json<AdminUserOut>> {
    Ok(Json(services::update_user(&state, &admin, id, payload).await?))
}

#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<Detail>> {
    services::delete_user(&state, &admin, id).await?;
    Ok(Json(Detail::new("User deleted")))
}

#[instrument(skip_all)]
pub async fn ocr_stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ApiQuery(q): ApiQuery<StatsQuery>,
) -> AppResult<Json<OcrStatistics>> {
    Ok(Json(services::ocr_stats(&state, q).await?))
}

#[instrument(skip_all)]
pub async fn get_settings(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<SystemSettings>> {
    Ok(Json(services::get_settings(&state).await?))
}

#[instrument(skip_all)]
pub async fn update_settings(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(payload): ApiJson<SystemSettings>,
) -> AppResult<Json<SystemSettings>> {
    Ok(Json(services::update_settings(&state, &admin, payload).await?))
}
