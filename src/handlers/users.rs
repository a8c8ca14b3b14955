use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::UserDto;
use crate::object_store;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(max = 64))]
    pub display_name: Option<String>,
    #[validate(length(max = 512))]
    pub bio: Option<String>,
    #[validate(length(min = 3, max = 32))]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAvatarRequest {
    pub file_id: i64,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation(
        e.field_errors()
            .values()
            .flat_map(|v| v.iter())
            .filter_map(|e| e.message.as_ref())
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

async fn to_dto(state: &AppState, user: crate::models::User) -> AppResult<UserDto> {
    let avatar_url = match user.avatar_file_id {
        Some(file_id) => db::files::get(&state.pool, file_id)
            .await?
            .map(|f| object_store::presigned_get_url(&state.config, &f.object_key)),
        None => None,
    };
    Ok(UserDto {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        bio: user.bio,
        avatar_url,
        is_admin: user.is_admin,
        is_active: user.is_active,
    })
}

pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UserDto>> {
    let user = db::users::get_by_id(&state.pool, auth.user_id())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(to_dto(&state, user).await?))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<UserDto>> {
    let user = db::users::get_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(to_dto(&state, user).await?))
}

pub async fn get_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<UserDto>> {
    let user = db::users::get_by_username(&state.pool, &username)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(to_dto(&state, user).await?))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<UserDto>>> {
    let users = db::users::search(&state.pool, &query.q, 20).await?;
    let mut out = Vec::with_capacity(users.len());
    for user in users {
        out.push(to_dto(&state, user).await?);
    }
    Ok(Json(out))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<UserDto>> {
    req.validate().map_err(validation_error)?;

    if id != auth.user_id() && !auth.is_admin() {
        return Err(AppError::Forbidden("Cannot edit another user's profile".into()));
    }

    let user = db::users::update_profile(
        &state.pool,
        id,
        req.display_name.as_deref(),
        req.bio.as_deref(),
        req.username.as_deref(),
    )
    .await?;

    Ok(Json(to_dto(&state, user).await?))
}

pub async fn update_my_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateAvatarRequest>,
) -> AppResult<Json<AvatarResponse>> {
    let file = db::files::get(&state.pool, req.file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;

    db::users::update_avatar(&state.pool, auth.user_id(), req.file_id).await?;

    Ok(Json(AvatarResponse {
        avatar_url: object_store::presigned_get_url(&state.config, &file.object_key),
    }))
}
