pub mod chats;
pub mod files;
pub mod invites;
pub mod messages;
pub mod settings;
pub mod stickers;
pub mod users;

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, AppResult};

pub async fn create_pool(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(|e| {
            tracing::error!(component = "store", error = ?e, "failed to connect to database");
            AppError::Database(e)
        })?;

    info!("Database connection pool created");
    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> AppResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

    Ok(())
}
