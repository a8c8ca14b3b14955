use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::{Chat, Membership, PerUserChatState, ReadCursor};

pub async fn get(pool: &PgPool, id: i64) -> AppResult<Option<Chat>> {
    let chat = sqlx::query_as::<_, Chat>(
        "SELECT id, type, name, title, description, public_name, owner_id, avatar_file_id,
                created_at, updated_at
         FROM chats WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(chat)
}

pub async fn insert(
    pool: &PgPool,
    chat_type: &str,
    name: Option<&str>,
    title: Option<&str>,
    owner_id: i64,
) -> AppResult<Chat> {
    let chat = sqlx::query_as::<_, Chat>(
        "INSERT INTO chats (type, name, title, owner_id)
         VALUES ($1, $2, $3, $4)
         RETURNING id, type, name, title, description, public_name, owner_id, avatar_file_id,
                   created_at, updated_at",
    )
    .bind(chat_type)
    .bind(name)
    .bind(title)
    .bind(owner_id)
    .fetch_one(pool)
    .await?;
    Ok(chat)
}

pub async fn update(
    pool: &PgPool,
    id: i64,
    name: Option<&str>,
    title: Option<&str>,
    description: Option<&str>,
    public_name: Option<&str>,
) -> AppResult<Chat> {
    let chat = sqlx::query_as::<_, Chat>(
        "UPDATE chats SET
             name        = COALESCE($2, name),
             title       = COALESCE($3, title),
             description = COALESCE($4, description),
             public_name = COALESCE($5, public_name),
             updated_at  = NOW()
         WHERE id = $1
         RETURNING id, type, name, title, description, public_name, owner_id, avatar_file_id,
                   created_at, updated_at",
    )
    .bind(id)
    .bind(name)
    .bind(title)
    .bind(description)
    .bind(public_name)
    .fetch_one(pool)
    .await?;
    Ok(chat)
}

pub async fn update_avatar(pool: &PgPool, id: i64, file_id: i64) -> AppResult<()> {
    sqlx::query("UPDATE chats SET avatar_file_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM chats WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Best-effort write-through, fire-and-forget at the call site.
pub async fn touch_updated_at(pool: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("UPDATE chats SET updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_direct_chat(pool: &PgPool, user_a: i64, user_b: i64) -> AppResult<Option<Chat>> {
    let chat = sqlx::query_as::<_, Chat>(
        "SELECT c.id, c.type, c.name, c.title, c.description, c.public_name, c.owner_id,
                c.avatar_file_id, c.created_at, c.updated_at
         FROM chats c
         WHERE c.type = 'direct'
           AND EXISTS (SELECT 1 FROM memberships m WHERE m.chat_id = c.id AND m.user_id = $1)
           AND EXISTS (SELECT 1 FROM memberships m WHERE m.chat_id = c.id AND m.user_id = $2)
           AND (SELECT COUNT(*) FROM memberships m WHERE m.chat_id = c.id) = 2
         LIMIT 1",
    )
    .bind(user_a)
    .bind(user_b)
    .fetch_optional(pool)
    .await?;
    Ok(chat)
}

// ============================================================================
// Membership
// ============================================================================

pub async fn membership(pool: &PgPool, chat_id: i64, user_id: i64) -> AppResult<Option<Membership>> {
    let membership = sqlx::query_as::<_, Membership>(
        "SELECT chat_id, user_id, role, joined_at FROM memberships WHERE chat_id = $1 AND user_id = $2",
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(membership)
}

pub async fn insert_membership(
    pool: &PgPool,
    chat_id: i64,
    user_id: i64,
    role: &str,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO memberships (chat_id, user_id, role) VALUES ($1, $2, $3)
         ON CONFLICT (chat_id, user_id) DO NOTHING",
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(role)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_membership(pool: &PgPool, chat_id: i64, user_id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM memberships WHERE chat_id = $1 AND user_id = $2")
        .bind(chat_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_role(pool: &PgPool, chat_id: i64, user_id: i64, role: &str) -> AppResult<()> {
    sqlx::query("UPDATE memberships SET role = $3 WHERE chat_id = $1 AND user_id = $2")
        .bind(chat_id)
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_members(pool: &PgPool, chat_id: i64) -> AppResult<Vec<Membership>> {
    let members = sqlx::query_as::<_, Membership>(
        "SELECT chat_id, user_id, role, joined_at FROM memberships WHERE chat_id = $1 ORDER BY joined_at ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;
    Ok(members)
}

/// All chat ids this user belongs to — used to fan out presence changes.
pub async fn chats_for_user(pool: &PgPool, user_id: i64) -> AppResult<Vec<i64>> {
    let ids: Vec<(i64,)> =
        sqlx::query_as("SELECT chat_id FROM memberships WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
    Ok(ids.into_iter().map(|r| r.0).collect())
}

pub async fn list_chats_for_user(pool: &PgPool, user_id: i64) -> AppResult<Vec<(Chat, String)>> {
    let rows: Vec<(Chat, String)> = sqlx::query_as(
        "SELECT c.id, c.type, c.name, c.title, c.description, c.public_name, c.owner_id,
                c.avatar_file_id, c.created_at, c.updated_at, m.role
         FROM chats c
         JOIN memberships m ON m.chat_id = c.id
         WHERE m.user_id = $1
         ORDER BY c.updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn browse_public(pool: &PgPool, limit: i64) -> AppResult<Vec<Chat>> {
    let chats = sqlx::query_as::<_, Chat>(
        "SELECT id, type, name, title, description, public_name, owner_id, avatar_file_id,
                created_at, updated_at
         FROM chats
         WHERE public_name IS NOT NULL
         ORDER BY created_at DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(chats)
}

// ============================================================================
// ReadCursor
// ============================================================================

/// Advances the cursor to the max of the current and new value.
pub async fn advance_read_cursor(
    pool: &PgPool,
    user_id: i64,
    chat_id: i64,
    msg_id: i64,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO read_cursors (user_id, chat_id, last_read_msg_id, read_at)
         VALUES ($1, $2, $3, NOW())
         ON CONFLICT (user_id, chat_id) DO UPDATE SET
             last_read_msg_id = GREATEST(read_cursors.last_read_msg_id, EXCLUDED.last_read_msg_id),
             read_at = NOW()",
    )
    .bind(user_id)
    .bind(chat_id)
    .bind(msg_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn read_cursor(pool: &PgPool, user_id: i64, chat_id: i64) -> AppResult<Option<ReadCursor>> {
    let cursor = sqlx::query_as::<_, ReadCursor>(
        "SELECT user_id, chat_id, last_read_msg_id, read_at FROM read_cursors
         WHERE user_id = $1 AND chat_id = $2",
    )
    .bind(user_id)
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(cursor)
}

// ============================================================================
// PerUserChatState
// ============================================================================

pub async fn get_or_default_state(
    pool: &PgPool,
    user_id: i64,
    chat_id: i64,
) -> AppResult<PerUserChatState> {
    let state = sqlx::query_as::<_, PerUserChatState>(
        "SELECT user_id, chat_id, is_favorite, muted_until, is_archived, pinned_in_sidebar
         FROM per_user_chat_state WHERE user_id = $1 AND chat_id = $2",
    )
    .bind(user_id)
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;

    Ok(state.unwrap_or(PerUserChatState {
        user_id,
        chat_id,
        is_favorite: false,
        muted_until: None,
        is_archived: false,
        pinned_in_sidebar: false,
    }))
}

pub async fn set_favorite(pool: &PgPool, user_id: i64, chat_id: i64, value: bool) -> AppResult<()> {
    upsert_state(pool, user_id, chat_id, "is_favorite", value as i32).await
}

pub async fn set_archived(pool: &PgPool, user_id: i64, chat_id: i64, value: bool) -> AppResult<()> {
    upsert_state(pool, user_id, chat_id, "is_archived", value as i32).await
}

pub async fn set_pinned_in_sidebar(
    pool: &PgPool,
    user_id: i64,
    chat_id: i64,
    value: bool,
) -> AppResult<()> {
    upsert_state(pool, user_id, chat_id, "pinned_in_sidebar", value as i32).await
}

async fn upsert_state(
    pool: &PgPool,
    user_id: i64,
    chat_id: i64,
    column: &str,
    value: i32,
) -> AppResult<()> {
    // `column` is always one of the hard-coded callers above, never user input.
    let sql = format!(
        "INSERT INTO per_user_chat_state (user_id, chat_id, {column})
         VALUES ($1, $2, $3)
         ON CONFLICT (user_id, chat_id) DO UPDATE SET {column} = EXCLUDED.{column}"
    );
    sqlx::query(&sql)
        .bind(user_id)
        .bind(chat_id)
        .bind(value != 0)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_muted_until(
    pool: &PgPool,
    user_id: i64,
    chat_id: i64,
    until: Option<DateTime<Utc>>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO per_user_chat_state (user_id, chat_id, muted_until)
         VALUES ($1, $2, $3)
         ON CONFLICT (user_id, chat_id) DO UPDATE SET muted_until = EXCLUDED.muted_until",
    )
    .bind(user_id)
    .bind(chat_id)
    .bind(until)
    .execute(pool)
    .await?;
    Ok(())
}
