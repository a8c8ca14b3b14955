use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::Sticker;

pub async fn get(pool: &PgPool, id: i64) -> AppResult<Option<Sticker>> {
    let sticker = sqlx::query_as::<_, Sticker>(
        "SELECT id, pack_name, emoji_shortcode, image_file_id FROM stickers WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(sticker)
}

pub async fn list_by_pack(pool: &PgPool, pack_name: &str) -> AppResult<Vec<Sticker>> {
    let stickers = sqlx::query_as::<_, Sticker>(
        "SELECT id, pack_name, emoji_shortcode, image_file_id FROM stickers
         WHERE pack_name = $1 ORDER BY id ASC",
    )
    .bind(pack_name)
    .fetch_all(pool)
    .await?;
    Ok(stickers)
}

pub async fn list_packs(pool: &PgPool) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT pack_name FROM stickers ORDER BY pack_name ASC")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn insert(
    pool: &PgPool,
    pack_name: &str,
    emoji_shortcode: Option<&str>,
    image_file_id: i64,
) -> AppResult<Sticker> {
    let sticker = sqlx::query_as::<_, Sticker>(
        "INSERT INTO stickers (pack_name, emoji_shortcode, image_file_id)
         VALUES ($1, $2, $3)
         RETURNING id, pack_name, emoji_shortcode, image_file_id",
    )
    .bind(pack_name)
    .bind(emoji_shortcode)
    .bind(image_file_id)
    .fetch_one(pool)
    .await?;
    Ok(sticker)
}
