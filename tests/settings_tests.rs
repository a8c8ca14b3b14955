mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn get_settings_returns_defaults_for_new_user() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let token = common::register_and_get_token(app, &common::unique_username(), "password123").await;

    let app = common::create_test_app(pool).await;
    let (status, body) = common::get_authed(app, "/settings", &token).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["read_receipts_enabled"], true);
}

#[tokio::test]
async fn update_settings_persists_changes() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let token = common::register_and_get_token(app, &common::unique_username(), "password123").await;

    let app = common::create_test_app(pool.clone()).await;
    let (status, body) = common::put_json_authed(
        app,
        "/settings",
        &token,
        json!({ "theme": "dark", "read_receipts_enabled": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["theme"], "dark");
    assert_eq!(body["read_receipts_enabled"], false);

    let app = common::create_test_app(pool).await;
    let (status, body) = common::get_authed(app, "/settings", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["theme"], "dark");
    assert_eq!(body["read_receipts_enabled"], false);
}

#[tokio::test]
async fn settings_require_auth() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;

    let (status, _) = common::get_no_auth(app, "/settings").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
