use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::auth::AuthUser;
use crate::authz;
use crate::broker::{self, publish_envelope};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::ChatDto;
use crate::object_store;
use crate::realtime::protocol;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChatRequest {
    #[serde(rename = "type")]
    pub chat_type: String,
    pub name: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChatRequest {
    pub name: Option<String>,
    pub title: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    pub public_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReadRequest {
    pub last_read_msg_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
    pub file_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: i64,
    pub username: String,
    pub role: String,
}

async fn to_dto(state: &AppState, chat: crate::models::Chat, my_role: Option<String>) -> AppResult<ChatDto> {
    let avatar_url = match chat.avatar_file_id {
        Some(file_id) => db::files::get(&state.pool, file_id)
            .await?
            .map(|f| object_store::presigned_get_url(&state.config, &f.object_key)),
        None => None,
    };
    Ok(ChatDto {
        id: chat.id,
        chat_type: chat.chat_type,
        name: chat.name,
        title: chat.title,
        description: chat.description,
        public_name: chat.public_name,
        owner_id: chat.owner_id,
        avatar_url,
        my_role,
        created_at: chat.created_at,
        updated_at: chat.updated_at,
    })
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateChatRequest>,
) -> AppResult<Json<ChatDto>> {
    if req.chat_type == "direct" {
        let Some(&other) = req.member_ids.first() else {
            return Err(AppError::Validation("direct chat requires exactly one member".into()));
        };
        if let Some(existing) = db::chats::find_direct_chat(&state.pool, auth.user_id(), other).await? {
            return Ok(Json(to_dto(&state, existing, Some("member".into())).await?));
        }
    }

    let chat = db::chats::insert(
        &state.pool,
        &req.chat_type,
        req.name.as_deref(),
        req.title.as_deref(),
        auth.user_id(),
    )
    .await?;

    db::chats::insert_membership(&state.pool, chat.id, auth.user_id(), "owner").await?;
    for &member_id in &req.member_ids {
        if member_id != auth.user_id() {
            db::chats::insert_membership(&state.pool, chat.id, member_id, "member").await?;
        }
    }

    let dto = to_dto(&state, chat, Some("owner".into())).await?;
    for &member_id in &req.member_ids {
        publish_envelope(&state.broker, &broker::user_channel(member_id), &protocol::chat_created(&dto)).await;
    }

    Ok(Json(dto))
}

pub async fn list(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<ChatDto>>> {
    let rows = db::chats::list_chats_for_user(&state.pool, auth.user_id()).await?;
    let mut out = Vec::with_capacity(rows.len());
    for (chat, role) in rows {
        out.push(to_dto(&state, chat, Some(role)).await?);
    }
    Ok(Json(out))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<Json<ChatDto>> {
    let membership = db::chats::membership(&state.pool, chat_id, auth.user_id()).await?;
    if membership.is_none() && !auth.is_admin() {
        return Err(AppError::NotFound("Chat not found".into()));
    }
    let chat = db::chats::get(&state.pool, chat_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;
    Ok(Json(to_dto(&state, chat, membership.map(|m| m.role)).await?))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Json(req): Json<UpdateChatRequest>,
) -> AppResult<Json<ChatDto>> {
    req.validate().map_err(|e| AppError::Validation(e.to_string()))?;

    if !authz::can_manage_chat(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("Only owners and admins can edit this chat".into()));
    }

    let chat = db::chats::update(
        &state.pool,
        chat_id,
        req.name.as_deref(),
        req.title.as_deref(),
        req.description.as_deref(),
        req.public_name.as_deref(),
    )
    .await?;

    let envelope = protocol::chat_updated(
        chat_id,
        json!({ "name": chat.name, "title": chat.title, "description": chat.description }),
    );
    publish_envelope(&state.broker, &broker::chat_channel(chat_id), &envelope).await;

    Ok(Json(to_dto(&state, chat, None).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    if !authz::can_manage_chat(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("Only owners and admins can delete this chat".into()));
    }
    db::chats::delete(&state.pool, chat_id).await?;
    publish_envelope(
        &state.broker,
        &broker::chat_channel(chat_id),
        &protocol::chat_deleted(chat_id, auth.user_id()),
    )
    .await;
    Ok(())
}

pub async fn update_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Json(req): Json<AvatarRequest>,
) -> AppResult<Json<ChatDto>> {
    if !authz::can_manage_chat(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("Only owners and admins can change the avatar".into()));
    }
    db::files::get(&state.pool, req.file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;
    db::chats::update_avatar(&state.pool, chat_id, req.file_id).await?;

    let chat = db::chats::get(&state.pool, chat_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;

    publish_envelope(
        &state.broker,
        &broker::chat_channel(chat_id),
        &protocol::chat_updated(chat_id, json!({ "avatar_file_id": req.file_id })),
    )
    .await;

    Ok(Json(to_dto(&state, chat, None).await?))
}

pub async fn leave(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    db::chats::remove_membership(&state.pool, chat_id, auth.user_id()).await?;
    Ok(())
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Json(req): Json<ReadRequest>,
) -> AppResult<()> {
    if !authz::is_member(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::NotFound("Chat not found".into()));
    }
    db::chats::advance_read_cursor(&state.pool, auth.user_id(), chat_id, req.last_read_msg_id).await?;

    let settings = db::settings::get_or_default(&state.pool, auth.user_id()).await?;
    if settings.read_receipts_enabled {
        publish_envelope(
            &state.broker,
            &broker::chat_channel(chat_id),
            &protocol::read_receipt(auth.user_id(), req.last_read_msg_id),
        )
        .await;
    }
    Ok(())
}

pub async fn set_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    db::chats::set_favorite(&state.pool, auth.user_id(), chat_id, true).await
}

pub async fn unset_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    db::chats::set_favorite(&state.pool, auth.user_id(), chat_id, false).await
}

pub async fn set_archived(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    db::chats::set_archived(&state.pool, auth.user_id(), chat_id, true).await
}

pub async fn unset_archived(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    db::chats::set_archived(&state.pool, auth.user_id(), chat_id, false).await
}

pub async fn set_pinned_in_sidebar(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    db::chats::set_pinned_in_sidebar(&state.pool, auth.user_id(), chat_id, true).await
}

pub async fn unset_pinned_in_sidebar(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    db::chats::set_pinned_in_sidebar(&state.pool, auth.user_id(), chat_id, false).await
}

pub async fn mute(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    let until = chrono::Utc::now() + chrono::Duration::days(365 * 10);
    db::chats::set_muted_until(&state.pool, auth.user_id(), chat_id, Some(until)).await
}

pub async fn unmute(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<()> {
    db::chats::set_muted_until(&state.pool, auth.user_id(), chat_id, None).await
}

pub async fn promote_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> AppResult<()> {
    if !authz::can_manage_chat(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("Only owners and admins can promote members".into()));
    }
    db::chats::update_role(&state.pool, chat_id, user_id, "admin").await
}

pub async fn demote_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> AppResult<()> {
    if !authz::can_manage_chat(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("Only owners and admins can demote members".into()));
    }
    db::chats::update_role(&state.pool, chat_id, user_id, "member").await
}
