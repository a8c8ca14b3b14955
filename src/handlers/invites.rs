use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::authz;
use crate::broker::{self, publish_envelope};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{Invite, InvitePreviewDto};
use crate::realtime::protocol;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<Json<Invite>> {
    if !authz::can_invite(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("You cannot invite to this chat".into()));
    }
    let token = Uuid::new_v4().simple().to_string();
    let invite = db::invites::insert(&state.pool, &token, chat_id, auth.user_id()).await?;
    Ok(Json(invite))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<Json<Vec<Invite>>> {
    if !authz::can_invite(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("You cannot view invites for this chat".into()));
    }
    let invites = db::invites::list_for_chat(&state.pool, chat_id).await?;
    Ok(Json(invites))
}

pub async fn revoke(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(token): Path<String>,
) -> AppResult<()> {
    let invite = db::invites::get_active(&state.pool, &token)
        .await?
        .ok_or_else(|| AppError::NotFound("Invite not found".into()))?;
    if !authz::can_invite(&state.pool, invite.chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("You cannot revoke this invite".into()));
    }
    db::invites::revoke(&state.pool, &token).await?;
    Ok(())
}

pub async fn preview(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<InvitePreviewDto>> {
    let preview = db::invites::preview(&state.pool, &token)
        .await?
        .ok_or_else(|| AppError::Gone("Invite not found or revoked".into()))?;
    Ok(Json(preview))
}

pub async fn join(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(token): Path<String>,
) -> AppResult<Json<crate::models::ChatDto>> {
    let invite = db::invites::get_active(&state.pool, &token)
        .await?
        .ok_or_else(|| AppError::Gone("Invite not found or revoked".into()))?;

    if db::chats::membership(&state.pool, invite.chat_id, auth.user_id()).await?.is_some() {
        return Err(AppError::Conflict("You are already a member of this chat".into()));
    }

    db::chats::insert_membership(&state.pool, invite.chat_id, auth.user_id(), "member").await?;

    let chat = db::chats::get(&state.pool, invite.chat_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;

    let dto = crate::models::ChatDto {
        id: chat.id,
        chat_type: chat.chat_type,
        name: chat.name,
        title: chat.title,
        description: chat.description,
        public_name: chat.public_name,
        owner_id: chat.owner_id,
        avatar_url: None,
        my_role: Some("member".to_string()),
        created_at: chat.created_at,
        updated_at: chat.updated_at,
    };

    publish_envelope(
        &state.broker,
        &broker::chat_channel(invite.chat_id),
        &protocol::chat_member_joined(invite.chat_id, auth.user_id()),
    )
    .await;
    publish_envelope(
        &state.broker,
        &broker::user_channel(auth.user_id()),
        &protocol::chat_created(&dto),
    )
    .await;

    Ok(Json(dto))
}
