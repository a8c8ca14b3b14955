//! Wire protocol for the `/ws` duplex endpoint. Every frame, in both
//! directions, is a flat JSON object carrying a `type` discriminator — there
//! is no nested envelope wrapper.

use serde::Deserialize;
use serde_json::{json, Value};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Auth {
        token: String,
        #[serde(default = "default_true")]
        active: bool,
    },
    Subscribe {
        chat_id: i64,
    },
    Typing {
        chat_id: i64,
    },
    PresenceUpdate {
        status: PresenceStatus,
    },
    Ping {
        #[serde(default)]
        active: Option<bool>,
    },
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Active,
    Away,
}

pub fn auth_ok(user_id: i64) -> Value {
    json!({ "type": "auth_ok", "user_id": user_id })
}

pub fn subscribed(chat_id: i64) -> Value {
    json!({ "type": "subscribed", "chat_id": chat_id })
}

pub fn error_frame(message: &str) -> Value {
    json!({ "type": "error", "message": message })
}

pub fn pong() -> Value {
    json!({ "type": "pong" })
}

pub fn typing(chat_id: i64, user_id: i64, username: &str) -> Value {
    json!({
        "type": "typing",
        "chat_id": chat_id,
        "user_id": user_id,
        "username": username,
    })
}

/// Full presence payload — shown to admins, the subject themselves, and
/// viewers when `last_seen_visibility = everyone`.
pub fn presence_full(user_id: i64, status: &str) -> Value {
    json!({ "type": "presence", "user_id": user_id, "status": status })
}

/// Bucketed presence payload — shown to non-admin viewers when
/// `last_seen_visibility = approx_only`.
pub fn presence_approx(user_id: i64, bucket: &str) -> Value {
    json!({
        "type": "presence",
        "user_id": user_id,
        "privacy": "approx_only",
        "last_seen_bucket": bucket,
    })
}

// ============================================================================
// Mutation envelopes published after a chat or message write commits
// ============================================================================

pub fn message_created(dto: &crate::models::MessageDto) -> Value {
    json!({
        "type": "message",
        "id": dto.id,
        "chat_id": dto.chat_id,
        "sender_id": dto.sender.id,
        "content": dto.content,
        "message_type": dto.message_type,
        "created_at": dto.created_at,
        "reply_to_message_id": dto.reply_to.as_ref().map(|r| r.message_id),
    })
}

pub fn message_updated(message_id: i64, content: &str, updated_at: chrono::DateTime<chrono::Utc>) -> Value {
    json!({
        "type": "message_updated",
        "message_id": message_id,
        "content": content,
        "updated_at": updated_at,
    })
}

pub fn message_deleted(message_id: i64, deleted_by: i64) -> Value {
    json!({
        "type": "message_deleted",
        "message_id": message_id,
        "deleted_by": deleted_by,
        "for_everyone": true,
    })
}

pub fn message_pinned(message_id: i64, pinned_by: i64, message: &crate::models::MessageDto) -> Value {
    json!({
        "type": "message_pinned",
        "message_id": message_id,
        "pinned_by": pinned_by,
        "message": message,
    })
}

pub fn message_unpinned(message_id: i64) -> Value {
    json!({ "type": "message_unpinned", "message_id": message_id })
}

pub fn reaction(message_id: i64, user_id: i64, emoji: &str, added: bool) -> Value {
    json!({
        "type": "reaction",
        "message_id": message_id,
        "user_id": user_id,
        "emoji": emoji,
        "action": if added { "added" } else { "removed" },
    })
}

pub fn read_receipt(user_id: i64, last_read_msg_id: i64) -> Value {
    json!({
        "type": "read_receipt",
        "user_id": user_id,
        "last_read_msg_id": last_read_msg_id,
    })
}

pub fn chat_member_joined(chat_id: i64, user_id: i64) -> Value {
    json!({ "type": "chat_member_joined", "chat_id": chat_id, "user_id": user_id })
}

pub fn chat_created(chat: &crate::models::ChatDto) -> Value {
    json!({ "type": "chat_created", "chat": chat })
}

pub fn chat_updated(chat_id: i64, changed_fields: Value) -> Value {
    let mut envelope = serde_json::Map::new();
    envelope.insert("type".to_string(), json!("chat_updated"));
    envelope.insert("chat_id".to_string(), json!(chat_id));
    if let Value::Object(fields) = changed_fields {
        envelope.extend(fields);
    }
    Value::Object(envelope)
}

pub fn chat_deleted(chat_id: i64, deleted_by: i64) -> Value {
    json!({ "type": "chat_deleted", "chat_id": chat_id, "deleted_by": deleted_by })
}
