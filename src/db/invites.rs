use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::{Invite, InvitePreviewDto};

pub async fn insert(pool: &PgPool, token: &str, chat_id: i64, created_by: i64) -> AppResult<Invite> {
    let invite = sqlx::query_as::<_, Invite>(
        "INSERT INTO invites (token, chat_id, created_by)
         VALUES ($1, $2, $3)
         RETURNING token, chat_id, created_by, created_at, revoked_at",
    )
    .bind(token)
    .bind(chat_id)
    .bind(created_by)
    .fetch_one(pool)
    .await?;
    Ok(invite)
}

pub async fn get_active(pool: &PgPool, token: &str) -> AppResult<Option<Invite>> {
    let invite = sqlx::query_as::<_, Invite>(
        "SELECT token, chat_id, created_by, created_at, revoked_at
         FROM invites WHERE token = $1 AND revoked_at IS NULL",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(invite)
}

pub async fn revoke(pool: &PgPool, token: &str) -> AppResult<()> {
    sqlx::query("UPDATE invites SET revoked_at = NOW() WHERE token = $1 AND revoked_at IS NULL")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn preview(pool: &PgPool, token: &str) -> AppResult<Option<InvitePreviewDto>> {
    let row: Option<(i64, Option<String>, String, i64)> = sqlx::query_as(
        "SELECT c.id, c.name, c.type, (SELECT COUNT(*) FROM memberships m WHERE m.chat_id = c.id)
         FROM invites i
         JOIN chats c ON c.id = i.chat_id
         WHERE i.token = $1 AND i.revoked_at IS NULL",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(chat_id, chat_name, chat_type, member_count)| InvitePreviewDto {
        chat_id,
        chat_name,
        chat_type,
        member_count,
    }))
}

pub async fn list_for_chat(pool: &PgPool, chat_id: i64) -> AppResult<Vec<Invite>> {
    let invites = sqlx::query_as::<_, Invite>(
        "SELECT token, chat_id, created_by, created_at, revoked_at
         FROM invites WHERE chat_id = $1 ORDER BY created_at DESC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;
    Ok(invites)
}
