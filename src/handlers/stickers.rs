use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::{AppError, AppResult};
use crate::object_store;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListStickersQuery {
    pub pack: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StickerResponse {
    pub id: i64,
    pub pack_name: String,
    pub emoji_shortcode: Option<String>,
    pub image_url: String,
}

async fn to_response(state: &AppState, sticker: crate::models::Sticker) -> AppResult<StickerResponse> {
    let image_url = match db::files::get(&state.pool, sticker.image_file_id).await? {
        Some(file) => object_store::presigned_get_url(&state.config, &file.object_key),
        None => String::new(),
    };
    Ok(StickerResponse {
        id: sticker.id,
        pack_name: sticker.pack_name,
        emoji_shortcode: sticker.emoji_shortcode,
        image_url,
    })
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListStickersQuery>,
) -> AppResult<Json<Vec<StickerResponse>>> {
    let stickers = match query.pack {
        Some(pack) => db::stickers::list_by_pack(&state.pool, &pack).await?,
        None => {
            let mut all = Vec::new();
            for pack in db::stickers::list_packs(&state.pool).await? {
                all.extend(db::stickers::list_by_pack(&state.pool, &pack).await?);
            }
            all
        }
    };

    let mut out = Vec::with_capacity(stickers.len());
    for sticker in stickers {
        out.push(to_response(&state, sticker).await?);
    }
    Ok(Json(out))
}

/// GET /stickers/{id}/image — 302 redirect to the sticker's signed image URL.
pub async fn image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<axum::response::Response> {
    let sticker = db::stickers::get(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sticker not found".into()))?;
    let file = db::files::get(&state.pool, sticker.image_file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sticker image not found".into()))?;

    let url = object_store::presigned_get_url(&state.config, &file.object_key);
    Ok(axum::response::Redirect::to(&url).into_response())
}
