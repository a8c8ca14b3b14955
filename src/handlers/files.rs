//! Multipart upload and signed download for user-supplied files (avatars,
//! message attachments, sticker images). Bytes live on local disk under
//! `config.upload_dir`; the object store facade only derives time-boxed
//! signed URLs pointing back at [`serve_object`].

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::object_store;
use crate::state::AppState;

const MAX_FILE_SIZE: usize = 52_428_800;

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/webm",
    "audio/mpeg",
    "audio/ogg",
    "audio/webm",
    "application/pdf",
    "text/plain",
];

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub id: i64,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    pub expires: i64,
    pub sig: String,
}

/// POST /files — multipart body with a single field named "file".
pub async fn upload(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, axum::Json<FileResponse>)> {
    let field = loop {
        let field = multipart.next_field().await.map_err(|e| {
            tracing::warn!(error = ?e, "failed to read multipart field");
            AppError::Validation("invalid multipart data".into())
        })?;
        match field {
            Some(f) if f.name().unwrap_or("") == "file" => break f,
            Some(_) => continue,
            None => return Err(AppError::Validation("missing field \"file\"".into())),
        }
    };

    let original_filename = field.file_name().unwrap_or("unknown").to_string();
    let data = field.bytes().await.map_err(|e| {
        tracing::warn!(error = ?e, "failed to read multipart bytes");
        AppError::Validation("failed to read file data".into())
    })?;

    if data.is_empty() {
        return Err(AppError::Validation("file must not be empty".into()));
    }
    if data.len() > MAX_FILE_SIZE {
        return Err(AppError::PayloadTooLarge("file exceeds the 50 MB limit".into()));
    }

    let mime_type = infer::get(&data)
        .map(|t| t.mime_type())
        .unwrap_or("application/octet-stream")
        .to_string();
    if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
        return Err(AppError::Validation(format!("file type '{mime_type}' is not allowed")));
    }

    let object_key = format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(&original_filename));
    let disk_path = state.config.upload_dir.join(&object_key);

    tokio::fs::create_dir_all(&state.config.upload_dir).await.map_err(|e| {
        tracing::error!(error = ?e, "failed to create upload directory");
        AppError::Internal
    })?;
    tokio::fs::write(&disk_path, &data).await.map_err(|e| {
        tracing::error!(error = ?e, path = ?disk_path, "failed to write uploaded file");
        AppError::Internal
    })?;

    let file = db::files::insert(
        &state.pool,
        auth.user_id(),
        &object_key,
        &original_filename,
        &mime_type,
        data.len() as i64,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        axum::Json(FileResponse {
            id: file.id,
            filename: file.original_filename,
            mime_type: file.mime_type,
            size_bytes: file.size_bytes,
        }),
    ))
}

/// GET /files/{id}/download — redirects to a time-boxed signed URL.
pub async fn download(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let file = db::files::get(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;

    let url = object_store::presigned_get_url(&state.config, &file.object_key);
    Ok(Redirect::to(&url).into_response())
}

/// GET /objects/{key} — unauthenticated, signature-gated static file serving.
/// This is the endpoint presigned URLs resolve to.
pub async fn serve_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ObjectQuery>,
) -> AppResult<Response> {
    if key.contains('/') || key.contains("..") {
        return Err(AppError::NotFound("object not found".into()));
    }
    if !object_store::verify(&state.config, &key, query.expires, &query.sig) {
        return Err(AppError::Forbidden("invalid or expired signature".into()));
    }

    let path = state.config.upload_dir.join(&key);
    let data = tokio::fs::read(&path).await.map_err(|_| AppError::NotFound("object not found".into()))?;

    let mime_type = infer::get(&data).map(|t| t.mime_type()).unwrap_or("application/octet-stream");
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .body(axum::body::Body::from(data))
        .map_err(|_| AppError::Internal)?)
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
