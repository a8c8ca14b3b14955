use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db;
use crate::error::AppResult;
use crate::models::UserSettings;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub theme: Option<String>,
    pub notifications_enabled: Option<bool>,
    pub language: Option<String>,
    pub read_receipts_enabled: Option<bool>,
    pub last_seen_visibility: Option<String>,
}

pub async fn get(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UserSettings>> {
    let settings = db::settings::get_or_default(&state.pool, auth.user_id()).await?;
    Ok(Json(settings))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateSettingsRequest>,
) -> AppResult<Json<UserSettings>> {
    let settings = db::settings::upsert(
        &state.pool,
        auth.user_id(),
        req.theme.as_deref(),
        req.notifications_enabled,
        req.language.as_deref(),
        req.read_receipts_enabled,
        req.last_seen_visibility.as_deref(),
    )
    .await?;
    Ok(Json(settings))
}
