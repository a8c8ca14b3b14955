use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

use crate::error::AppResult;
use crate::models::{
    AttachmentDto, Message, MessageDto, PinnedMessage, ReactionCount, ReplyPreviewDto, StickerDto,
    UserDto,
};

pub enum Page {
    After(i64),
    Before(i64),
    Newest,
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<Option<Message>> {
    let message = sqlx::query_as::<_, Message>(
        "SELECT id, chat_id, sender_id, content, message_type, created_at, updated_at,
                is_edited, is_deleted, reply_to_message_id, forwarded_from_chat_id,
                forwarded_from_message_id, forwarded_from_user_id, forwarded_from_display_name,
                file_id, sticker_id, duration_seconds
         FROM messages WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(message)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    pool: &PgPool,
    chat_id: i64,
    sender_id: i64,
    content: Option<&str>,
    message_type: &str,
    file_id: Option<i64>,
    sticker_id: Option<i64>,
    duration_seconds: Option<i32>,
    reply_to: Option<i64>,
) -> AppResult<(i64, DateTime<Utc>)> {
    let row: (i64, DateTime<Utc>) = sqlx::query_as(
        "INSERT INTO messages (chat_id, sender_id, content, message_type, file_id, sticker_id,
                                duration_seconds, reply_to_message_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id, created_at",
    )
    .bind(chat_id)
    .bind(sender_id)
    .bind(content)
    .bind(message_type)
    .bind(file_id)
    .bind(sticker_id)
    .bind(duration_seconds)
    .bind(reply_to)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_forwarded(
    pool: &PgPool,
    chat_id: i64,
    sender_id: i64,
    content: Option<&str>,
    message_type: &str,
    from_chat_id: i64,
    from_message_id: i64,
    from_user_id: i64,
    from_display_name: &str,
) -> AppResult<(i64, DateTime<Utc>)> {
    let row: (i64, DateTime<Utc>) = sqlx::query_as(
        "INSERT INTO messages (chat_id, sender_id, content, message_type,
                                forwarded_from_chat_id, forwarded_from_message_id,
                                forwarded_from_user_id, forwarded_from_display_name)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id, created_at",
    )
    .bind(chat_id)
    .bind(sender_id)
    .bind(content)
    .bind(message_type)
    .bind(from_chat_id)
    .bind(from_message_id)
    .bind(from_user_id)
    .bind(from_display_name)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn update_content(pool: &PgPool, id: i64, content: &str) -> AppResult<DateTime<Utc>> {
    let row: (DateTime<Utc>,) = sqlx::query_as(
        "UPDATE messages SET content = $2, is_edited = TRUE, updated_at = NOW()
         WHERE id = $1
         RETURNING updated_at",
    )
    .bind(id)
    .bind(content)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Soft-delete visible to everyone. `AND is_deleted = FALSE` guards against a
/// double-delete race between two concurrent requests for the same message.
pub async fn delete_for_everyone(pool: &PgPool, id: i64) -> AppResult<bool> {
    let result = sqlx::query("UPDATE messages SET is_deleted = TRUE WHERE id = $1 AND is_deleted = FALSE")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_for_user(pool: &PgPool, user_id: i64, message_id: i64) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO deleted_for_user (user_id, message_id) VALUES ($1, $2)
         ON CONFLICT (user_id, message_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Enriched message rows: core fields + sender profile + sticker/attachment +
/// reply-to preview. Filters out soft-deleted and per-viewer-hidden rows.
pub async fn enriched_messages(
    pool: &PgPool,
    chat_id: i64,
    viewer: i64,
    page: Page,
    limit: i64,
) -> AppResult<Vec<MessageDto>> {
    let rows: Vec<Message> = match page {
        Page::After(after_id) => {
            sqlx::query_as(
                "SELECT m.id, m.chat_id, m.sender_id, m.content, m.message_type, m.created_at,
                        m.updated_at, m.is_edited, m.is_deleted, m.reply_to_message_id,
                        m.forwarded_from_chat_id, m.forwarded_from_message_id,
                        m.forwarded_from_user_id, m.forwarded_from_display_name,
                        m.file_id, m.sticker_id, m.duration_seconds
                 FROM messages m
                 WHERE m.chat_id = $1 AND m.id > $2 AND m.is_deleted = FALSE
                   AND NOT EXISTS (SELECT 1 FROM deleted_for_user d WHERE d.message_id = m.id AND d.user_id = $3)
                 ORDER BY m.id ASC
                 LIMIT $4",
            )
            .bind(chat_id)
            .bind(after_id)
            .bind(viewer)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        Page::Before(before_id) => {
            let mut rows: Vec<Message> = sqlx::query_as(
                "SELECT m.id, m.chat_id, m.sender_id, m.content, m.message_type, m.created_at,
                        m.updated_at, m.is_edited, m.is_deleted, m.reply_to_message_id,
                        m.forwarded_from_chat_id, m.forwarded_from_message_id,
                        m.forwarded_from_user_id, m.forwarded_from_display_name,
                        m.file_id, m.sticker_id, m.duration_seconds
                 FROM messages m
                 WHERE m.chat_id = $1 AND m.id < $2 AND m.is_deleted = FALSE
                   AND NOT EXISTS (SELECT 1 FROM deleted_for_user d WHERE d.message_id = m.id AND d.user_id = $3)
                 ORDER BY m.id DESC
                 LIMIT $4",
            )
            .bind(chat_id)
            .bind(before_id)
            .bind(viewer)
            .bind(limit)
            .fetch_all(pool)
            .await?;
            rows.reverse();
            rows
        }
        Page::Newest => {
            let mut rows: Vec<Message> = sqlx::query_as(
                "SELECT m.id, m.chat_id, m.sender_id, m.content, m.message_type, m.created_at,
                        m.updated_at, m.is_edited, m.is_deleted, m.reply_to_message_id,
                        m.forwarded_from_chat_id, m.forwarded_from_message_id,
                        m.forwarded_from_user_id, m.forwarded_from_display_name,
                        m.file_id, m.sticker_id, m.duration_seconds
                 FROM messages m
                 WHERE m.chat_id = $1 AND m.is_deleted = FALSE
                   AND NOT EXISTS (SELECT 1 FROM deleted_for_user d WHERE d.message_id = m.id AND d.user_id = $2)
                 ORDER BY m.id DESC
                 LIMIT $3",
            )
            .bind(chat_id)
            .bind(viewer)
            .bind(limit)
            .fetch_all(pool)
            .await?;
            rows.reverse();
            rows
        }
    };

    enrich(pool, rows).await
}

/// Single enriched message, used when an envelope or response needs the full
/// joined view of one row (e.g. the pin confirmation).
pub async fn get_enriched(pool: &PgPool, id: i64) -> AppResult<Option<MessageDto>> {
    let Some(row) = get(pool, id).await? else {
        return Ok(None);
    };
    Ok(enrich(pool, vec![row]).await?.into_iter().next())
}

pub async fn search_messages(
    pool: &PgPool,
    chat_id: i64,
    viewer: i64,
    q: &str,
    before_id: Option<i64>,
    limit: i64,
) -> AppResult<Vec<MessageDto>> {
    let pattern = format!("%{}%", q);
    let rows: Vec<Message> = sqlx::query_as(
        "SELECT m.id, m.chat_id, m.sender_id, m.content, m.message_type, m.created_at,
                m.updated_at, m.is_edited, m.is_deleted, m.reply_to_message_id,
                m.forwarded_from_chat_id, m.forwarded_from_message_id,
                m.forwarded_from_user_id, m.forwarded_from_display_name,
                m.file_id, m.sticker_id, m.duration_seconds
         FROM messages m
         WHERE m.chat_id = $1 AND m.message_type = 'text' AND m.is_deleted = FALSE
           AND m.content ILIKE $2
           AND ($3::BIGINT IS NULL OR m.id < $3)
           AND NOT EXISTS (SELECT 1 FROM deleted_for_user d WHERE d.message_id = m.id AND d.user_id = $4)
         ORDER BY m.id DESC
         LIMIT $5",
    )
    .bind(chat_id)
    .bind(pattern)
    .bind(before_id)
    .bind(viewer)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    enrich(pool, rows).await
}

/// Shared enrichment: batch-fetch senders, attachments, stickers, reply
/// previews for a set of message rows rather than issuing N+1 queries.
async fn enrich(pool: &PgPool, rows: Vec<Message>) -> AppResult<Vec<MessageDto>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let sender_ids: Vec<i64> = rows.iter().map(|m| m.sender_id).collect();
    let senders = fetch_users_by_ids(pool, &sender_ids).await?;

    let file_ids: Vec<i64> = rows.iter().filter_map(|m| m.file_id).collect();
    let files = fetch_files_by_ids(pool, &file_ids).await?;

    let sticker_ids: Vec<i64> = rows.iter().filter_map(|m| m.sticker_id).collect();
    let stickers = fetch_stickers_by_ids(pool, &sticker_ids).await?;

    let reply_ids: Vec<i64> = rows.iter().filter_map(|m| m.reply_to_message_id).collect();
    let reply_previews = fetch_reply_previews(pool, &reply_ids).await?;

    let mut out = Vec::with_capacity(rows.len());
    for m in rows {
        let sender = senders
            .get(&m.sender_id)
            .cloned()
            .unwrap_or_else(|| placeholder_user(m.sender_id));

        let attachment = m.file_id.and_then(|fid| files.get(&fid)).map(|f| AttachmentDto {
            file_id: f.0,
            filename: f.1.clone(),
            mime_type: f.2.clone(),
            size_bytes: f.3,
            url: f.4.clone(),
        });

        let sticker = m.sticker_id.and_then(|sid| stickers.get(&sid)).cloned();

        let reply_to = m
            .reply_to_message_id
            .and_then(|rid| reply_previews.get(&rid))
            .cloned();

        out.push(MessageDto {
            id: m.id,
            chat_id: m.chat_id,
            sender,
            content: m.content,
            message_type: m.message_type,
            created_at: m.created_at,
            updated_at: m.updated_at,
            is_edited: m.is_edited,
            reply_to,
            forwarded_from_display_name: m.forwarded_from_display_name,
            attachment,
            sticker,
            duration_seconds: m.duration_seconds,
        });
    }

    Ok(out)
}

fn placeholder_user(id: i64) -> UserDto {
    UserDto {
        id,
        username: "unknown".to_string(),
        display_name: None,
        bio: None,
        avatar_url: None,
        is_admin: false,
        is_active: false,
    }
}

async fn fetch_users_by_ids(pool: &PgPool, ids: &[i64]) -> AppResult<HashMap<i64, UserDto>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<crate::models::User> = sqlx::query_as(
        "SELECT id, username, email, password_hash, display_name, bio, avatar_file_id,
                is_admin, is_blocked, is_active, last_activity, created_at, updated_at
         FROM users WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let avatar_keys: Vec<i64> = rows.iter().filter_map(|u| u.avatar_file_id).collect();
    let avatar_files = fetch_files_by_ids(pool, &avatar_keys).await?;

    Ok(rows
        .into_iter()
        .map(|u| {
            let avatar_url = u.avatar_file_id.and_then(|fid| avatar_files.get(&fid)).map(|f| f.4.clone());
            (
                u.id,
                UserDto {
                    id: u.id,
                    username: u.username,
                    display_name: u.display_name,
                    bio: u.bio,
                    avatar_url,
                    is_admin: u.is_admin,
                    is_active: u.is_active,
                },
            )
        })
        .collect())
}

/// Maps file id -> (id, filename, mime_type, size_bytes, object_key). The
/// object_key is presigned into a full URL by the caller, which alone holds
/// the object-store configuration.
async fn fetch_files_by_ids(
    pool: &PgPool,
    ids: &[i64],
) -> AppResult<HashMap<i64, (i64, String, String, i64, String)>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<crate::models::FileRow> = sqlx::query_as(
        "SELECT id, owner_id, object_key, original_filename, mime_type, size_bytes, created_at
         FROM files WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|f| {
            (
                f.id,
                (f.id, f.original_filename, f.mime_type, f.size_bytes, f.object_key),
            )
        })
        .collect())
}

async fn fetch_stickers_by_ids(pool: &PgPool, ids: &[i64]) -> AppResult<HashMap<i64, StickerDto>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<crate::models::Sticker> = sqlx::query_as(
        "SELECT s.id, s.pack_name, s.emoji_shortcode, s.image_file_id
         FROM stickers s WHERE s.id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let image_ids: Vec<i64> = rows.iter().map(|s| s.image_file_id).collect();
    let images = fetch_files_by_ids(pool, &image_ids).await?;

    Ok(rows
        .into_iter()
        .map(|s| {
            let image_url = images
                .get(&s.image_file_id)
                .map(|f| f.4.clone())
                .unwrap_or_default();
            (
                s.id,
                StickerDto {
                    id: s.id,
                    pack_name: s.pack_name,
                    emoji_shortcode: s.emoji_shortcode,
                    image_url,
                },
            )
        })
        .collect())
}

async fn fetch_reply_previews(
    pool: &PgPool,
    ids: &[i64],
) -> AppResult<HashMap<i64, ReplyPreviewDto>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, Option<String>, String, i64, Option<String>, String)> = sqlx::query_as(
        "SELECT m.id, m.content, m.message_type, u.id, u.display_name, u.username
         FROM messages m
         JOIN users u ON u.id = m.sender_id
         WHERE m.id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, content, message_type, _uid, display_name, username)| {
            (
                id,
                ReplyPreviewDto {
                    message_id: id,
                    content,
                    message_type,
                    sender_name: display_name.unwrap_or(username),
                },
            )
        })
        .collect())
}

// ============================================================================
// Reactions
// ============================================================================

/// Toggle (message, user, emoji); returns true if the reaction was added,
/// false if it was removed. An involution: applying it twice restores state.
pub async fn toggle_reaction(
    pool: &PgPool,
    message_id: i64,
    user_id: i64,
    emoji: &str,
) -> AppResult<bool> {
    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM reactions WHERE message_id = $1 AND user_id = $2 AND emoji = $3",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        sqlx::query("DELETE FROM reactions WHERE message_id = $1 AND user_id = $2 AND emoji = $3")
            .bind(message_id)
            .bind(user_id)
            .bind(emoji)
            .execute(pool)
            .await?;
        Ok(false)
    } else {
        sqlx::query(
            "INSERT INTO reactions (message_id, user_id, emoji) VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(pool)
        .await?;
        Ok(true)
    }
}

pub async fn reactions_by_message_ids(
    pool: &PgPool,
    viewer: i64,
    message_ids: &[i64],
) -> AppResult<HashMap<i64, Vec<ReactionCount>>> {
    if message_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(i64, String, i64, bool)> = sqlx::query_as(
        "SELECT message_id, emoji, COUNT(*) AS count, BOOL_OR(user_id = $2) AS me
         FROM reactions
         WHERE message_id = ANY($1)
         GROUP BY message_id, emoji
         ORDER BY message_id, emoji",
    )
    .bind(message_ids)
    .bind(viewer)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<ReactionCount>> = HashMap::new();
    for (message_id, emoji, count, me) in rows {
        grouped
            .entry(message_id)
            .or_default()
            .push(ReactionCount { emoji, count, me });
    }
    Ok(grouped)
}

// ============================================================================
// PinnedMessage
// ============================================================================

pub async fn pin(pool: &PgPool, chat_id: i64, message_id: i64, pinned_by: i64) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO pinned_messages (chat_id, message_id, pinned_by) VALUES ($1, $2, $3)",
    )
    .bind(chat_id)
    .bind(message_id)
    .bind(pinned_by)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unpin(pool: &PgPool, chat_id: i64) -> AppResult<()> {
    sqlx::query(
        "UPDATE pinned_messages SET unpinned_at = NOW() WHERE chat_id = $1 AND unpinned_at IS NULL",
    )
    .bind(chat_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn active_pinned_message(pool: &PgPool, chat_id: i64) -> AppResult<Option<PinnedMessage>> {
    let pinned = sqlx::query_as::<_, PinnedMessage>(
        "SELECT chat_id, message_id, pinned_by, pinned_at, unpinned_at
         FROM pinned_messages WHERE chat_id = $1 AND unpinned_at IS NULL",
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(pinned)
}
