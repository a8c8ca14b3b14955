use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_file_id: Option<i64>,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub is_active: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public-facing view of a user. Never carries `password_hash`.
#[derive(Debug, Clone, Serialize)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Chat {
    pub id: i64,
    #[sqlx(rename = "type")]
    pub chat_type: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub public_name: Option<String>,
    pub owner_id: i64,
    pub avatar_file_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatDto {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub public_name: Option<String>,
    pub owner_id: i64,
    pub avatar_url: Option<String>,
    pub my_role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Membership
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Membership {
    pub chat_id: i64,
    pub user_id: i64,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberDto {
    pub user: UserDto,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

// ============================================================================
// Message
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub reply_to_message_id: Option<i64>,
    pub forwarded_from_chat_id: Option<i64>,
    pub forwarded_from_message_id: Option<i64>,
    pub forwarded_from_user_id: Option<i64>,
    pub forwarded_from_display_name: Option<String>,
    pub file_id: Option<i64>,
    pub sticker_id: Option<i64>,
    pub duration_seconds: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyPreviewDto {
    pub message_id: i64,
    pub content: Option<String>,
    pub message_type: String,
    pub sender_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentDto {
    pub file_id: i64,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StickerDto {
    pub id: i64,
    pub pack_name: String,
    pub emoji_shortcode: Option<String>,
    pub image_url: String,
}

/// Enriched message row returned by read endpoints: core fields plus joins.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDto {
    pub id: i64,
    pub chat_id: i64,
    pub sender: UserDto,
    pub content: Option<String>,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_edited: bool,
    pub reply_to: Option<ReplyPreviewDto>,
    pub forwarded_from_display_name: Option<String>,
    pub attachment: Option<AttachmentDto>,
    pub sticker: Option<StickerDto>,
    pub duration_seconds: Option<i32>,
}

// ============================================================================
// Reaction
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: i64,
    pub me: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionSummaryDto {
    pub message_id: i64,
    pub reactions: Vec<ReactionCount>,
}

// ============================================================================
// PinnedMessage
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PinnedMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub pinned_by: i64,
    pub pinned_at: DateTime<Utc>,
    pub unpinned_at: Option<DateTime<Utc>>,
}

// ============================================================================
// ReadCursor / PerUserChatState
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ReadCursor {
    pub user_id: i64,
    pub chat_id: i64,
    pub last_read_msg_id: i64,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PerUserChatState {
    pub user_id: i64,
    pub chat_id: i64,
    pub is_favorite: bool,
    pub muted_until: Option<DateTime<Utc>>,
    pub is_archived: bool,
    pub pinned_in_sidebar: bool,
}

// ============================================================================
// Invite
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Invite {
    pub token: String,
    pub chat_id: i64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvitePreviewDto {
    pub chat_id: i64,
    pub chat_name: Option<String>,
    pub chat_type: String,
    pub member_count: i64,
}

// ============================================================================
// UserSettings
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct UserSettings {
    pub user_id: i64,
    pub theme: String,
    pub notifications_enabled: bool,
    pub language: String,
    pub read_receipts_enabled: bool,
    pub last_seen_visibility: String,
}

// ============================================================================
// Sticker / File
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Sticker {
    pub id: i64,
    pub pack_name: String,
    pub emoji_shortcode: Option<String>,
    pub image_file_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRow {
    pub id: i64,
    pub owner_id: i64,
    pub object_key: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDto {
    pub id: i64,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
}
