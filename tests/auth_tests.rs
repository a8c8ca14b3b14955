mod common;

use axum::http::StatusCode;
use serde_json::json;

// ============================================================================
// register_success
// ============================================================================

#[tokio::test]
async fn register_success() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let username = common::unique_username();

    let (status, body) = common::post_json(
        app,
        "/auth/register",
        json!({
            "username": username,
            "email": common::unique_email(&username),
            "password": "securepassword123",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], username.as_str());
    assert!(body["id"].is_number());
}

// ============================================================================
// register_duplicate_username
// ============================================================================

#[tokio::test]
async fn register_duplicate_username() {
    let pool = common::test_pool().await;
    let username = common::unique_username();

    let app = common::create_test_app(pool.clone()).await;
    let (status, _) = common::post_json(
        app,
        "/auth/register",
        json!({
            "username": username,
            "email": common::unique_email(&username),
            "password": "securepassword123",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Same username, different email: must still fail with 409.
    let app = common::create_test_app(pool).await;
    let (status, body) = common::post_json(
        app,
        "/auth/register",
        json!({
            "username": username,
            "email": format!("other-{}", common::unique_email(&username)),
            "password": "anotherpassword123",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string(), "expected 'error' key in body: {body}");
}

// ============================================================================
// register_validates_short_password
// ============================================================================

#[tokio::test]
async fn register_validates_short_password() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let username = common::unique_username();

    // Password is exactly 7 characters — one below the 8-character minimum.
    let (status, body) = common::post_json(
        app,
        "/auth/register",
        json!({
            "username": username,
            "email": common::unique_email(&username),
            "password": "short12",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// ============================================================================
// register_validates_malformed_email
// ============================================================================

#[tokio::test]
async fn register_validates_malformed_email() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let username = common::unique_username();

    let (status, _) = common::post_json(
        app,
        "/auth/register",
        json!({
            "username": username,
            "email": "not-an-email",
            "password": "securepassword123",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// login_success_and_refresh
// ============================================================================

#[tokio::test]
async fn login_success_and_refresh() {
    let pool = common::test_pool().await;
    let username = common::unique_username();

    let app = common::create_test_app(pool.clone()).await;
    common::register_user(app, &username, "securepassword123").await;

    let app = common::create_test_app(pool.clone()).await;
    let (status, body) = common::post_json(
        app,
        "/auth/login",
        json!({ "username": username, "password": "securepassword123" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["token_type"], "Bearer");

    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();
    let app = common::create_test_app(pool).await;
    let (status, body) = common::post_json(
        app,
        "/auth/refresh",
        json!({ "refresh_token": refresh_token }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());
}

// ============================================================================
// login_rejects_wrong_password
// ============================================================================

#[tokio::test]
async fn login_rejects_wrong_password() {
    let pool = common::test_pool().await;
    let username = common::unique_username();

    let app = common::create_test_app(pool.clone()).await;
    common::register_user(app, &username, "securepassword123").await;

    let app = common::create_test_app(pool).await;
    let (status, body) = common::post_json(
        app,
        "/auth/login",
        json!({ "username": username, "password": "wrong-password" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

// ============================================================================
// refresh_rejects_garbage_token
// ============================================================================

#[tokio::test]
async fn refresh_rejects_garbage_token() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;

    let (status, _) = common::post_json(
        app,
        "/auth/refresh",
        json!({ "refresh_token": "not-a-real-token" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// me_requires_auth
// ============================================================================

#[tokio::test]
async fn me_requires_auth() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;

    let (status, _) = common::get_no_auth(app, "/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// me_returns_authenticated_user
// ============================================================================

#[tokio::test]
async fn me_returns_authenticated_user() {
    let pool = common::test_pool().await;
    let username = common::unique_username();

    let app = common::create_test_app(pool.clone()).await;
    let token = common::register_and_get_token(app, &username, "securepassword123").await;

    let app = common::create_test_app(pool).await;
    let (status, body) = common::get_authed(app, "/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], username.as_str());
}
