use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::UserSettings;

fn defaults(user_id: i64) -> UserSettings {
    UserSettings {
        user_id,
        theme: "system".to_string(),
        notifications_enabled: true,
        language: "en".to_string(),
        read_receipts_enabled: true,
        last_seen_visibility: "everyone".to_string(),
    }
}

pub async fn get_or_default(pool: &PgPool, user_id: i64) -> AppResult<UserSettings> {
    let row = sqlx::query_as::<_, UserSettings>(
        "SELECT user_id, theme, notifications_enabled, language, read_receipts_enabled,
                last_seen_visibility
         FROM user_settings WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.unwrap_or_else(|| defaults(user_id)))
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert(
    pool: &PgPool,
    user_id: i64,
    theme: Option<&str>,
    notifications_enabled: Option<bool>,
    language: Option<&str>,
    read_receipts_enabled: Option<bool>,
    last_seen_visibility: Option<&str>,
) -> AppResult<UserSettings> {
    let current = get_or_default(pool, user_id).await?;

    let theme = theme.unwrap_or(&current.theme).to_string();
    let notifications_enabled = notifications_enabled.unwrap_or(current.notifications_enabled);
    let language = language.unwrap_or(&current.language).to_string();
    let read_receipts_enabled = read_receipts_enabled.unwrap_or(current.read_receipts_enabled);
    let last_seen_visibility = last_seen_visibility
        .unwrap_or(&current.last_seen_visibility)
        .to_string();

    let row = sqlx::query_as::<_, UserSettings>(
        "INSERT INTO user_settings (user_id, theme, notifications_enabled, language,
                                     read_receipts_enabled, last_seen_visibility)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (user_id) DO UPDATE SET
             theme = EXCLUDED.theme,
             notifications_enabled = EXCLUDED.notifications_enabled,
             language = EXCLUDED.language,
             read_receipts_enabled = EXCLUDED.read_receipts_enabled,
             last_seen_visibility = EXCLUDED.last_seen_visibility
         RETURNING user_id, theme, notifications_enabled, language, read_receipts_enabled,
                   last_seen_visibility",
    )
    .bind(user_id)
    .bind(theme)
    .bind(notifications_enabled)
    .bind(language)
    .bind(read_receipts_enabled)
    .bind(last_seen_visibility)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
