use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::User;

pub async fn get_by_id(pool: &PgPool, id: i64) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, display_name, bio, avatar_file_id,
                is_admin, is_blocked, is_active, last_activity, created_at, updated_at
         FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn get_by_username(pool: &PgPool, username: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, display_name, bio, avatar_file_id,
                is_admin, is_blocked, is_active, last_activity, created_at, updated_at
         FROM users WHERE LOWER(username) = LOWER($1)",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn search(pool: &PgPool, q: &str, limit: i64) -> AppResult<Vec<User>> {
    let pattern = format!("%{}%", q);
    let users = sqlx::query_as::<_, User>(
        "SELECT id, username, email, password_hash, display_name, bio, avatar_file_id,
                is_admin, is_blocked, is_active, last_activity, created_at, updated_at
         FROM users
         WHERE is_active = TRUE AND username ILIKE $1
         ORDER BY username ASC
         LIMIT $2",
    )
    .bind(pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(users)
}

pub async fn insert(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
    display_name: Option<&str>,
) -> AppResult<User> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, password_hash, display_name)
         VALUES ($1, $2, $3, $4)
         RETURNING id, username, email, password_hash, display_name, bio, avatar_file_id,
                   is_admin, is_blocked, is_active, last_activity, created_at, updated_at",
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(display_name)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn update_profile(
    pool: &PgPool,
    id: i64,
    display_name: Option<&str>,
    bio: Option<&str>,
    username: Option<&str>,
) -> AppResult<User> {
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET
             display_name = COALESCE($2, display_name),
             bio          = COALESCE($3, bio),
             username     = COALESCE($4, username),
             updated_at   = NOW()
         WHERE id = $1
         RETURNING id, username, email, password_hash, display_name, bio, avatar_file_id,
                   is_admin, is_blocked, is_active, last_activity, created_at, updated_at",
    )
    .bind(id)
    .bind(display_name)
    .bind(bio)
    .bind(username)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn update_avatar(pool: &PgPool, id: i64, file_id: i64) -> AppResult<()> {
    sqlx::query("UPDATE users SET avatar_file_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Idempotent write-through of `last_activity`; always overwrites with now.
pub async fn touch_last_activity(pool: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("UPDATE users SET last_activity = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn last_activity(pool: &PgPool, id: i64) -> AppResult<Option<DateTime<Utc>>> {
    let row: Option<(Option<DateTime<Utc>>,)> =
        sqlx::query_as("SELECT last_activity FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|r| r.0))
}

// ============================================================================
// Refresh-token sessions
// ============================================================================

pub async fn insert_refresh_session(
    pool: &PgPool,
    user_id: i64,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO refresh_sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the owning user id if the hash matches an active, unexpired session.
pub async fn find_active_refresh_session(
    pool: &PgPool,
    token_hash: &str,
) -> AppResult<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT user_id FROM refresh_sessions
         WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > NOW()",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}
