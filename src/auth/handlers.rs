use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{Detail, LoginForm, RefreshRequest, RegisterRequest, Token, UserOut},
        extractors::AuthUser,
        jwt::JwtKeys,
        services,
    },
    error::AppResult,
    extract::{ApiForm, ApiJson},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh))
        .route("/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserOut>)> {
    let user = services::register_user(&state.db, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiForm(form): ApiForm<LoginForm>,
) -> AppResult<Json<Token>> {
    let keys = JwtKeys::from_ref(&state);
    let token = services::login_user(&state.db, &keys, &form.username, &form.password).await?;
    Ok(Json(token))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> AppResult<Json<Token>> {
    let keys = JwtKeys::from_ref(&state);
    let token = services::refresh_tokens(&state.db, &keys, &payload.refresh_token).await?;
    Ok(Json(token))
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> AppResult<Json<Detail>> {
    let keys = JwtKeys::from_ref(&state);
    services::logout(&state.db, &keys, &payload.refresh_token).await?;
    Ok(Json(Detail::new("Successfully logged out")))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<UserOut> {
    Json(user.into())
}
