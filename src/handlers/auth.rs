use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::{
    create_access_token, create_refresh_token, hash_password, hash_refresh_token, verify_password,
};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    req.validate().map_err(|e| AppError::Validation(e.to_string()))?;

    if db::users::get_by_username(&state.pool, &req.username).await?.is_some() {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = db::users::insert(
        &state.pool,
        &req.username,
        &req.email,
        &password_hash,
        req.display_name.as_deref(),
    )
    .await?;

    info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { id: user.id, username: user.username }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    req.validate().map_err(|e| AppError::Validation(e.to_string()))?;

    let user = db::users::get_by_username(&state.pool, &req.username)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Invalid username or password".into()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::Unauthenticated("Invalid username or password".into()));
    }
    if user.is_blocked {
        return Err(AppError::Forbidden("Account is blocked".into()));
    }

    let tokens = issue_tokens(&state, user.id, user.is_admin).await?;
    db::users::touch_last_activity(&state.pool, user.id).await?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(tokens))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let token_hash = hash_refresh_token(&req.refresh_token);
    let user_id = db::users::find_active_refresh_session(&state.pool, &token_hash)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Invalid or expired refresh token".into()))?;

    let user = db::users::get_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("User no longer exists".into()))?;

    let access_token = create_access_token(
        user.id,
        user.is_admin,
        &state.jwt_secret,
        state.config.jwt_access_ttl_minutes,
    )?;

    Ok(Json(RefreshResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.config.jwt_access_ttl_minutes * 60,
    }))
}

async fn issue_tokens(state: &AppState, user_id: i64, is_admin: bool) -> AppResult<TokenResponse> {
    let access_token = create_access_token(
        user_id,
        is_admin,
        &state.jwt_secret,
        state.config.jwt_access_ttl_minutes,
    )?;
    let refresh_token = create_refresh_token(
        user_id,
        is_admin,
        &state.jwt_secret,
        state.config.jwt_refresh_ttl_minutes,
    )?;

    let expires_at = chrono::Utc::now()
        + chrono::Duration::minutes(state.config.jwt_refresh_ttl_minutes);
    let token_hash = hash_refresh_token(&refresh_token);
    db::users::insert_refresh_session(&state.pool, user_id, &token_hash, expires_at).await?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: state.config.jwt_access_ttl_minutes * 60,
        user_id,
    })
}
