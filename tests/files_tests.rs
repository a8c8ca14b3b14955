mod common;

use axum::http::StatusCode;
use common::MultipartFile;

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

#[tokio::test]
async fn upload_png_succeeds() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let token = common::register_and_get_token(app, &common::unique_username(), "password123").await;

    let app = common::create_test_app(pool).await;
    let files = [MultipartFile {
        field_name: "file",
        filename: "avatar.png",
        content_type: "image/png",
        data: PNG_MAGIC,
    }];
    let (status, body) = common::post_multipart_authed(app, "/files", &token, &files).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["mime_type"], "image/png");
    assert!(body["id"].is_number());
}

#[tokio::test]
async fn upload_requires_auth() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;

    let files = [MultipartFile {
        field_name: "file",
        filename: "avatar.png",
        content_type: "image/png",
        data: PNG_MAGIC,
    }];
    let (status, _) = common::post_multipart_no_auth(app, "/files", &files).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upload_rejects_disallowed_mime_type() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let token = common::register_and_get_token(app, &common::unique_username(), "password123").await;

    let app = common::create_test_app(pool).await;
    // An ELF header — not in the allow-list.
    let files = [MultipartFile {
        field_name: "file",
        filename: "payload.bin",
        content_type: "application/octet-stream",
        data: &[0x7f, 0x45, 0x4c, 0x46, 0, 0, 0, 0],
    }];
    let (status, _) = common::post_multipart_authed(app, "/files", &token, &files).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_rejects_empty_file() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let token = common::register_and_get_token(app, &common::unique_username(), "password123").await;

    let app = common::create_test_app(pool).await;
    let files = [MultipartFile {
        field_name: "file",
        filename: "empty.png",
        content_type: "image/png",
        data: &[],
    }];
    let (status, _) = common::post_multipart_authed(app, "/files", &token, &files).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_redirects_to_signed_url() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let token = common::register_and_get_token(app, &common::unique_username(), "password123").await;

    let app = common::create_test_app(pool.clone()).await;
    let files = [MultipartFile {
        field_name: "file",
        filename: "avatar.png",
        content_type: "image/png",
        data: PNG_MAGIC,
    }];
    let (_, uploaded) = common::post_multipart_authed(app, "/files", &token, &files).await;
    let file_id = uploaded["id"].as_i64().unwrap();

    let app = common::create_test_app(pool).await;
    let (status, _) =
        common::get_raw_authed(app, &format!("/files/{file_id}/download"), &token).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
}
