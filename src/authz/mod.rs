//! Pure, stateless authorization predicates over the store. Every function
//! treats a store error as "deny" — callers never have to special-case a
//! failed lookup differently from an unauthorized one.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::db;
use crate::models::Message;

const DELETE_FOR_EVERYONE_WINDOW_MINUTES: i64 = 48 * 60;

pub async fn is_member(pool: &PgPool, chat_id: i64, user_id: i64) -> bool {
    matches!(db::chats::membership(pool, chat_id, user_id).await, Ok(Some(_)))
}

pub async fn role_in(pool: &PgPool, chat_id: i64, user_id: i64, roles: &[&str]) -> bool {
    match db::chats::membership(pool, chat_id, user_id).await {
        Ok(Some(m)) => roles.contains(&m.role.as_str()),
        _ => false,
    }
}

/// Direct and group members may always post. Channels restrict posting to
/// owners and admins.
pub async fn can_post(pool: &PgPool, chat_id: i64, user_id: i64) -> bool {
    if !is_member(pool, chat_id, user_id).await {
        return false;
    }
    match db::chats::get(pool, chat_id).await {
        Ok(Some(chat)) if chat.chat_type == "channel" => {
            role_in(pool, chat_id, user_id, &["owner", "admin"]).await
        }
        Ok(Some(_)) => true,
        _ => false,
    }
}

pub async fn can_pin(pool: &PgPool, chat_id: i64, user_id: i64) -> bool {
    role_in(pool, chat_id, user_id, &["owner", "admin"]).await
}

pub async fn can_manage_chat(pool: &PgPool, chat_id: i64, user_id: i64) -> bool {
    role_in(pool, chat_id, user_id, &["owner", "admin"]).await
}

pub async fn can_invite(pool: &PgPool, chat_id: i64, user_id: i64) -> bool {
    if !can_manage_chat(pool, chat_id, user_id).await {
        return false;
    }
    match db::chats::get(pool, chat_id).await {
        Ok(Some(chat)) => chat.chat_type != "direct",
        _ => false,
    }
}

pub async fn can_edit(pool: &PgPool, message: &Message, user_id: i64) -> bool {
    if message.is_deleted || message.message_type != "text" {
        return false;
    }
    message.sender_id == user_id && is_member(pool, message.chat_id, user_id).await
}

/// Sender or owner/admin may delete-for-everyone within the 48h window.
/// There is no `force_delete` override, so owner/admin deletions are bound
/// by the same window as the sender's own.
pub async fn can_delete_for_everyone(pool: &PgPool, message: &Message, user_id: i64) -> bool {
    if !is_member(pool, message.chat_id, user_id).await {
        return false;
    }
    if message.sender_id != user_id
        && !role_in(pool, message.chat_id, user_id, &["owner", "admin"]).await
    {
        return false;
    }
    Utc::now() - message.created_at < Duration::minutes(DELETE_FOR_EVERYONE_WINDOW_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_message(sender_id: i64, created_at: chrono::DateTime<Utc>) -> Message {
        Message {
            id: 1,
            chat_id: 1,
            sender_id,
            content: Some("hi".into()),
            message_type: "text".into(),
            created_at,
            updated_at: None,
            is_edited: false,
            is_deleted: false,
            reply_to_message_id: None,
            forwarded_from_chat_id: None,
            forwarded_from_message_id: None,
            forwarded_from_user_id: None,
            forwarded_from_display_name: None,
            file_id: None,
            sticker_id: None,
            duration_seconds: None,
        }
    }

    #[test]
    fn delete_window_boundary_is_respected_in_isolation() {
        let fresh = sample_message(1, Utc::now());
        let stale = sample_message(1, Utc::now() - Duration::hours(49));
        assert!(Utc::now() - fresh.created_at < Duration::minutes(DELETE_FOR_EVERYONE_WINDOW_MINUTES));
        assert!(Utc::now() - stale.created_at > Duration::minutes(DELETE_FOR_EVERYONE_WINDOW_MINUTES));
    }
}
