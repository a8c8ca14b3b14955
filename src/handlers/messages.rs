use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::authz;
use crate::broker::{self, publish_envelope};
use crate::db;
use crate::db::messages::Page;
use crate::error::{AppError, AppResult};
use crate::models::{MessageDto, ReactionCount};
use crate::object_store;
use crate::realtime::protocol;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;
const DEFAULT_SEARCH_LIMIT: i64 = 20;
const MAX_SEARCH_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub content: Option<String>,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    pub file_id: Option<i64>,
    pub sticker_id: Option<i64>,
    pub duration_seconds: Option<i32>,
    pub reply_to_message_id: Option<i64>,
}

fn default_message_type() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessageQuery {
    #[serde(default)]
    pub for_everyone: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub after_id: Option<i64>,
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchMessagesQuery {
    pub q: String,
    pub before_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactionsQuery {
    pub message_ids: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionsMapResponse {
    pub message_id: i64,
    pub reactions: Vec<ReactionCount>,
}

#[derive(Debug, Deserialize)]
pub struct ForwardRequest {
    pub from_chat_id: i64,
    pub message_ids: Vec<i64>,
}

fn clamp(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

/// Patches `object_key` placeholders left by the store layer into real
/// presigned URLs. The store has no object-store configuration of its own.
fn presign(config: &crate::config::Config, dto: &mut MessageDto) {
    if let Some(attachment) = dto.attachment.as_mut() {
        attachment.url = object_store::presigned_get_url(config, &attachment.url);
    }
    if let Some(sticker) = dto.sticker.as_mut() {
        sticker.image_url = object_store::presigned_get_url(config, &sticker.image_url);
    }
    if let Some(avatar_key) = dto.sender.avatar_url.take() {
        dto.sender.avatar_url = Some(object_store::presigned_get_url(config, &avatar_key));
    }
}

fn presign_all(config: &crate::config::Config, dtos: &mut [MessageDto]) {
    for dto in dtos {
        presign(config, dto);
    }
}

/// Touches the chat's `updated_at` and advances the sender's own read cursor
/// to the newly created message. Neither write should fail the request once
/// the message itself is persisted, so errors are logged and discarded.
async fn touch_chat_and_advance_cursor(
    pool: &sqlx::PgPool,
    chat_id: i64,
    sender_id: i64,
    message_id: i64,
) {
    if let Err(e) = db::chats::touch_updated_at(pool, chat_id).await {
        tracing::warn!(error = ?e, chat_id, "failed to touch chat updated_at after message insert");
    }
    if let Err(e) = db::chats::advance_read_cursor(pool, sender_id, chat_id, message_id).await {
        tracing::warn!(error = ?e, chat_id, sender_id, "failed to advance sender's read cursor after message insert");
    }
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Json(req): Json<CreateMessageRequest>,
) -> AppResult<(axum::http::StatusCode, Json<MessageDto>)> {
    if !authz::can_post(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("You cannot post in this chat".into()));
    }
    if req.content.is_none() && req.file_id.is_none() && req.sticker_id.is_none() {
        return Err(AppError::Validation(
            "message must have content, a file, or a sticker".into(),
        ));
    }

    let (id, _created_at) = db::messages::insert(
        &state.pool,
        chat_id,
        auth.user_id(),
        req.content.as_deref(),
        &req.message_type,
        req.file_id,
        req.sticker_id,
        req.duration_seconds,
        req.reply_to_message_id,
    )
    .await?;

    touch_chat_and_advance_cursor(&state.pool, chat_id, auth.user_id(), id).await;

    let mut dto = db::messages::get_enriched(&state.pool, id)
        .await?
        .ok_or(AppError::Internal)?;
    presign(&state.config, &mut dto);

    publish_envelope(&state.broker, &broker::chat_channel(chat_id), &protocol::message_created(&dto)).await;

    Ok((axum::http::StatusCode::CREATED, Json(dto)))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Query(query): Query<ListMessagesQuery>,
) -> AppResult<Json<Vec<MessageDto>>> {
    if !authz::is_member(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::NotFound("Chat not found".into()));
    }

    let limit = clamp(query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let page = match (query.after_id, query.before) {
        (Some(after_id), _) => Page::After(after_id),
        (None, Some(before)) => Page::Before(before),
        (None, None) => Page::Newest,
    };

    let mut messages =
        db::messages::enriched_messages(&state.pool, chat_id, auth.user_id(), page, limit).await?;
    presign_all(&state.config, &mut messages);
    Ok(Json(messages))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateMessageRequest>,
) -> AppResult<Json<MessageDto>> {
    let message = db::messages::get(&state.pool, message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;
    if message.chat_id != chat_id {
        return Err(AppError::NotFound("Message not found".into()));
    }
    if !authz::can_edit(&state.pool, &message, auth.user_id()).await {
        return Err(AppError::Forbidden("You cannot edit this message".into()));
    }

    let updated_at = db::messages::update_content(&state.pool, message_id, &req.content).await?;

    publish_envelope(
        &state.broker,
        &broker::chat_channel(chat_id),
        &protocol::message_updated(message_id, &req.content, updated_at),
    )
    .await;

    let mut dto = db::messages::get_enriched(&state.pool, message_id)
        .await?
        .ok_or(AppError::Internal)?;
    presign(&state.config, &mut dto);
    Ok(Json(dto))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(i64, i64)>,
    Query(query): Query<DeleteMessageQuery>,
) -> AppResult<()> {
    let message = db::messages::get(&state.pool, message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;
    if message.chat_id != chat_id {
        return Err(AppError::NotFound("Message not found".into()));
    }

    if query.for_everyone {
        if !authz::can_delete_for_everyone(&state.pool, &message, auth.user_id()).await {
            return Err(AppError::Forbidden(
                "You cannot delete this message for everyone".into(),
            ));
        }
        db::messages::delete_for_everyone(&state.pool, message_id).await?;
        publish_envelope(
            &state.broker,
            &broker::chat_channel(chat_id),
            &protocol::message_deleted(message_id, auth.user_id()),
        )
        .await;
    } else {
        if !authz::is_member(&state.pool, chat_id, auth.user_id()).await {
            return Err(AppError::Forbidden("You are not a member of this chat".into()));
        }
        db::messages::delete_for_user(&state.pool, auth.user_id(), message_id).await?;
    }

    Ok(())
}

pub async fn pin(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(i64, i64)>,
) -> AppResult<()> {
    if !authz::can_pin(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("Only owners and admins can pin messages".into()));
    }
    let message = db::messages::get(&state.pool, message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;
    if message.chat_id != chat_id {
        return Err(AppError::NotFound("Message not found".into()));
    }

    db::messages::unpin(&state.pool, chat_id).await?;
    db::messages::pin(&state.pool, chat_id, message_id, auth.user_id()).await?;

    let mut dto = db::messages::get_enriched(&state.pool, message_id)
        .await?
        .ok_or(AppError::Internal)?;
    presign(&state.config, &mut dto);

    publish_envelope(
        &state.broker,
        &broker::chat_channel(chat_id),
        &protocol::message_pinned(message_id, auth.user_id(), &dto),
    )
    .await;

    Ok(())
}

pub async fn unpin(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(i64, i64)>,
) -> AppResult<()> {
    if !authz::can_pin(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("Only owners and admins can unpin messages".into()));
    }
    db::messages::unpin(&state.pool, chat_id).await?;
    publish_envelope(
        &state.broker,
        &broker::chat_channel(chat_id),
        &protocol::message_unpinned(message_id),
    )
    .await;
    Ok(())
}

pub async fn pinned_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> AppResult<Json<Option<MessageDto>>> {
    if !authz::is_member(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::NotFound("Chat not found".into()));
    }
    let Some(pinned) = db::messages::active_pinned_message(&state.pool, chat_id).await? else {
        return Ok(Json(None));
    };
    let mut dto = db::messages::get_enriched(&state.pool, pinned.message_id).await?;
    if let Some(dto) = dto.as_mut() {
        presign(&state.config, dto);
    }
    Ok(Json(dto))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Query(query): Query<SearchMessagesQuery>,
) -> AppResult<Json<Vec<MessageDto>>> {
    if !authz::is_member(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::NotFound("Chat not found".into()));
    }
    let limit = clamp(query.limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
    let mut messages = db::messages::search_messages(
        &state.pool,
        chat_id,
        auth.user_id(),
        &query.q,
        query.before_id,
        limit,
    )
    .await?;
    presign_all(&state.config, &mut messages);
    Ok(Json(messages))
}

pub async fn toggle_reaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(i64, i64)>,
    Json(req): Json<ReactionRequest>,
) -> AppResult<()> {
    if !authz::is_member(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("You are not a member of this chat".into()));
    }
    let added =
        db::messages::toggle_reaction(&state.pool, message_id, auth.user_id(), &req.emoji).await?;

    publish_envelope(
        &state.broker,
        &broker::chat_channel(chat_id),
        &protocol::reaction(message_id, auth.user_id(), &req.emoji, added),
    )
    .await;
    Ok(())
}

pub async fn reactions_for_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Query(query): Query<ReactionsQuery>,
) -> AppResult<Json<Vec<ReactionsMapResponse>>> {
    if !authz::is_member(&state.pool, chat_id, auth.user_id()).await {
        return Err(AppError::NotFound("Chat not found".into()));
    }
    let message_ids: Vec<i64> = query
        .message_ids
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let grouped =
        db::messages::reactions_by_message_ids(&state.pool, auth.user_id(), &message_ids).await?;
    let out = grouped
        .into_iter()
        .map(|(message_id, reactions)| ReactionsMapResponse { message_id, reactions })
        .collect();
    Ok(Json(out))
}

pub async fn forward(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_chat_id): Path<i64>,
    Json(req): Json<ForwardRequest>,
) -> AppResult<Json<Vec<MessageDto>>> {
    if !authz::can_post(&state.pool, target_chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("You cannot post in this chat".into()));
    }
    if !authz::is_member(&state.pool, req.from_chat_id, auth.user_id()).await {
        return Err(AppError::Forbidden("You are not a member of the source chat".into()));
    }

    let sender = db::users::get_by_id(&state.pool, auth.user_id())
        .await?
        .ok_or(AppError::Internal)?;
    let display_name = sender.display_name.clone().unwrap_or(sender.username.clone());

    let mut created = Vec::with_capacity(req.message_ids.len());
    for &message_id in &req.message_ids {
        let original = db::messages::get(&state.pool, message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".into()))?;
        if original.chat_id != req.from_chat_id {
            return Err(AppError::Validation("message does not belong to from_chat_id".into()));
        }

        let (id, _) = db::messages::insert_forwarded(
            &state.pool,
            target_chat_id,
            auth.user_id(),
            original.content.as_deref(),
            &original.message_type,
            req.from_chat_id,
            message_id,
            auth.user_id(),
            &display_name,
        )
        .await?;

        touch_chat_and_advance_cursor(&state.pool, target_chat_id, auth.user_id(), id).await;

        let mut dto = db::messages::get_enriched(&state.pool, id)
            .await?
            .ok_or(AppError::Internal)?;
        presign(&state.config, &mut dto);

        publish_envelope(
            &state.broker,
            &broker::chat_channel(target_chat_id),
            &protocol::message_created(&dto),
        )
        .await;
        created.push(dto);
    }

    Ok(Json(created))
}
