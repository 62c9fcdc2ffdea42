use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::{
    auth::{
        dto::{RegisterRequest, Token},
        jwt::JwtKeys,
        password,
        repo::is_unique_violation,
        repo_types::{RefreshTokenRow, User},
    },
    error::{AppError, AppResult},
};

pub const MAX_USERNAME_LEN: usize = 64;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trims and checks a registration payload in place.
pub fn validate_registration(req: &mut RegisterRequest) -> Result<(), String> {
    req.email = normalize_email(&req.email);
    req.username = req.username.trim().to_string();

    if !is_valid_email(&req.email) {
        return Err("Invalid email".into());
    }
    let name_len = req.username.chars().count();
    if name_len == 0 || name_len > MAX_USERNAME_LEN {
        return Err(format!(
            "Username must be between 1 and {} characters",
            MAX_USERNAME_LEN
        ));
    }
    password::check_strength(&req.password)
}

pub async fn register_user(db: &PgPool, mut req: RegisterRequest) -> AppResult<User> {
    validate_registration(&mut req).map_err(AppError::BadRequest)?;

    if User::find_by_email(db, &req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::bad_request("A user with this email already exists"));
    }
    if User::find_by_username(db, &req.username).await?.is_some() {
        warn!(username = %req.username, "username already taken");
        return Err(AppError::bad_request("A user with this username already exists"));
    }

    let hash = password::hash_password(&req.password)?;
    let user = match User::create(db, &req.email, &req.username, &hash).await {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::bad_request(
                "A user with this email or username already exists",
            ))
        }
        Err(e) => return Err(e.context("create user").into()),
    };

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Signs an access/refresh pair and records the refresh token.
pub async fn issue_tokens(db: &PgPool, keys: &JwtKeys, user_id: uuid::Uuid) -> AppResult<Token> {
    let access = keys.sign_access(user_id)?;
    let refresh = keys.sign_refresh(user_id)?;
    RefreshTokenRow::insert(db, refresh.jti, user_id, refresh.expires_at).await?;
    Ok(Token {
        access_token: access.token,
        refresh_token: refresh.token,
        token_type: "bearer",
        expires_at: access.expires_at,
    })
}

pub async fn login_user(
    db: &PgPool,
    keys: &JwtKeys,
    username: &str,
    plain: &str,
) -> AppResult<Token> {
    let invalid = || AppError::unauthorized("Incorrect username or password");

    let user = match User::find_by_username(db, username.trim()).await? {
        Some(u) => u,
        None => {
            password::verify_against_dummy(plain);
            warn!(username = %username, "login unknown username");
            return Err(invalid());
        }
    };

    if !password::verify_password(plain, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }
    if !user.is_active {
        warn!(user_id = %user.id, "login on disabled account");
        return Err(AppError::unauthorized("Account is disabled"));
    }

    let token = issue_tokens(db, keys, user.id).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(token)
}

/// Rotates a refresh token: the presented one is revoked, a new pair is issued.
pub async fn refresh_tokens(db: &PgPool, keys: &JwtKeys, refresh_token: &str) -> AppResult<Token> {
    let invalid = || AppError::unauthorized("Invalid or expired refresh token");

    let claims = keys.verify_refresh(refresh_token).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        invalid()
    })?;

    let row = RefreshTokenRow::consume(db, claims.jti)
        .await?
        .ok_or_else(invalid)?;
    if row.user_id != claims.sub {
        warn!(jti = %row.jti, "refresh token subject mismatch");
        return Err(invalid());
    }
    debug!(jti = %row.jti, expires_at = %row.expires_at, "refresh token consumed");

    let user = User::find_by_id(db, row.user_id).await?;
    match user {
        Some(u) if u.is_active => {
            let token = issue_tokens(db, keys, u.id).await?;
            info!(user_id = %u.id, "tokens refreshed");
            Ok(token)
        }
        _ => Err(AppError::unauthorized("User not found or inactive")),
    }
}

/// Revokes the refresh token if it is still valid; unknown tokens are ignored.
pub async fn logout(db: &PgPool, keys: &JwtKeys, refresh_token: &str) -> AppResult<()> {
    if let Ok(claims) = keys.verify_refresh(refresh_token) {
        if RefreshTokenRow::consume(db, claims.jti).await?.is_some() {
            info!(user_id = %claims.sub, "refresh token revoked");
        }
    }
    Ok(())
}
