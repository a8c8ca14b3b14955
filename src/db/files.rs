use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::FileRow;

pub async fn get(pool: &PgPool, id: i64) -> AppResult<Option<FileRow>> {
    let file = sqlx::query_as::<_, FileRow>(
        "SELECT id, owner_id, object_key, original_filename, mime_type, size_bytes, created_at
         FROM files WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(file)
}

pub async fn insert(
    pool: &PgPool,
    owner_id: i64,
    object_key: &str,
    original_filename: &str,
    mime_type: &str,
    size_bytes: i64,
) -> AppResult<FileRow> {
    let file = sqlx::query_as::<_, FileRow>(
        "INSERT INTO files (owner_id, object_key, original_filename, mime_type, size_bytes)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, owner_id, object_key, original_filename, mime_type, size_bytes, created_at",
    )
    .bind(owner_id)
    .bind(object_key)
    .bind(original_filename)
    .bind(mime_type)
    .bind(size_bytes)
    .fetch_one(pool)
    .await?;
    Ok(file)
}
