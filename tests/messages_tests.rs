mod common;

use axum::http::StatusCode;
use serde_json::json;

async fn setup_chat(app: axum::Router) -> (String, i64) {
    let token = common::register_and_get_token(app.clone(), &common::unique_username(), "password123").await;
    let chat = common::create_chat(app, &token, "group", Some("Test Chat")).await;
    (token, chat["id"].as_i64().unwrap())
}

#[tokio::test]
async fn create_message_success() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    let (status, body) = common::post_json_authed(
        app,
        &format!("/chats/{chat_id}/messages"),
        &token,
        json!({ "content": "Hello world!", "message_type": "text" }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["content"], "Hello world!");
    assert_eq!(body["chat_id"], chat_id);
}

#[tokio::test]
async fn create_message_requires_content_file_or_sticker() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    let (status, _) = common::post_json_authed(
        app,
        &format!("/chats/{chat_id}/messages"),
        &token,
        json!({ "message_type": "text" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_message_non_member_forbidden() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let (_, chat_id) = setup_chat(app).await;

    let app = common::create_test_app(pool).await;
    let outsider = common::register_and_get_token(app.clone(), &common::unique_username(), "password123").await;

    let (status, _) = common::post_json_authed(
        app,
        &format!("/chats/{chat_id}/messages"),
        &outsider,
        json!({ "content": "Sneaky!", "message_type": "text" }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_message_requires_auth() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let (_, chat_id) = setup_chat(app).await;

    let app = common::create_test_app(pool).await;
    let (status, _) = common::post_json(
        app,
        &format!("/chats/{chat_id}/messages"),
        json!({ "content": "No auth", "message_type": "text" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_messages_newest_first() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    common::create_message(app.clone(), &token, chat_id, "first").await;
    common::create_message(app.clone(), &token, chat_id, "second").await;
    common::create_message(app.clone(), &token, chat_id, "third").await;

    let (status, body) =
        common::get_authed(app, &format!("/chats/{chat_id}/messages"), &token).await;

    assert_eq!(status, StatusCode::OK);
    let msgs = body.as_array().unwrap();
    assert_eq!(msgs.len(), 3);
    assert_eq!(msgs[0]["content"], "third");
    assert_eq!(msgs[2]["content"], "first");
}

#[tokio::test]
async fn message_ids_are_monotone_with_creation_order() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    let m1 = common::create_message(app.clone(), &token, chat_id, "one").await;
    let m2 = common::create_message(app.clone(), &token, chat_id, "two").await;

    assert!(m2["id"].as_i64().unwrap() > m1["id"].as_i64().unwrap());
    assert!(m2["created_at"].as_str().unwrap() >= m1["created_at"].as_str().unwrap());
}

#[tokio::test]
async fn list_messages_non_member_returns_404() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let (_, chat_id) = setup_chat(app).await;

    let app = common::create_test_app(pool).await;
    let outsider = common::register_and_get_token(app.clone(), &common::unique_username(), "password123").await;

    let (status, _) =
        common::get_authed(app, &format!("/chats/{chat_id}/messages"), &outsider).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_message_by_sender_succeeds() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    let msg = common::create_message(app.clone(), &token, chat_id, "original").await;
    let mid = msg["id"].as_i64().unwrap();

    let (status, body) = common::put_json_authed(
        app,
        &format!("/chats/{chat_id}/messages/{mid}"),
        &token,
        json!({ "content": "edited" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "edited");
}

#[tokio::test]
async fn update_message_by_non_sender_forbidden() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool.clone()).await;
    let owner_token = common::register_and_get_token(app.clone(), &common::unique_username(), "password123").await;
    let member_token = common::register_and_get_token(app.clone(), &common::unique_username(), "password123").await;

    let (_, member_id_body) = common::get_authed(app.clone(), "/me", &member_token).await;
    let member_id = member_id_body["id"].as_i64().unwrap();

    let chat = common::post_json_authed(
        app.clone(),
        "/chats",
        &owner_token,
        json!({ "type": "group", "name": "Edits", "member_ids": [member_id] }),
    )
    .await
    .1;
    let chat_id = chat["id"].as_i64().unwrap();

    let msg = common::create_message(app.clone(), &owner_token, chat_id, "owner message").await;
    let mid = msg["id"].as_i64().unwrap();

    let (status, _) = common::put_json_authed(
        app,
        &format!("/chats/{chat_id}/messages/{mid}"),
        &member_token,
        json!({ "content": "hijacked" }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_for_me_only_hides_for_caller() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    let msg = common::create_message(app.clone(), &token, chat_id, "visible to others").await;
    let mid = msg["id"].as_i64().unwrap();

    let (status, _) = common::delete_authed(
        app.clone(),
        &format!("/chats/{chat_id}/messages/{mid}"),
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The message still exists in the chat (delete-for-me is per-viewer, not
    // a hard delete) — a fresh fetch from the same user omits it.
    let (status, body) =
        common::get_authed(app, &format!("/chats/{chat_id}/messages"), &token).await;
    assert_eq!(status, StatusCode::OK);
    let msgs = body.as_array().unwrap();
    assert!(!msgs.iter().any(|m| m["id"] == mid));
}

#[tokio::test]
async fn delete_for_everyone_within_window_succeeds() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    let msg = common::create_message(app.clone(), &token, chat_id, "recent").await;
    let mid = msg["id"].as_i64().unwrap();

    let (status, _) = common::delete_authed(
        app,
        &format!("/chats/{chat_id}/messages/{mid}?for_everyone=true"),
        &token,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reaction_toggle_is_an_involution() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    let msg = common::create_message(app.clone(), &token, chat_id, "react to me").await;
    let mid = msg["id"].as_i64().unwrap();

    let (status, _) = common::post_json_authed(
        app.clone(),
        &format!("/chats/{chat_id}/messages/{mid}/reactions"),
        &token,
        json!({ "emoji": "👍" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::post_json_authed(
        app,
        &format!("/chats/{chat_id}/messages/{mid}/reactions"),
        &token,
        json!({ "emoji": "👍" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "toggling the same emoji twice should remove it, not error");
}

#[tokio::test]
async fn pin_then_unpin_clears_pinned_message() {
    let pool = common::test_pool().await;
    let app = common::create_test_app(pool).await;
    let (token, chat_id) = setup_chat(app.clone()).await;

    let msg = common::create_message(app.clone(), &token, chat_id, "pin me").await;
    let mid = msg["id"].as_i64().unwrap();

    let (status, _) = common::post_json_authed(
        app.clone(),
        &format!("/chats/{chat_id}/messages/{mid}/pin"),
        &token,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        common::get_authed(app.clone(), &format!("/chats/{chat_id}/pinned-message"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], mid);

    let (status, _) = common::delete_authed(
        app.clone(),
        &format!("/chats/{chat_id}/messages/{mid}/pin"),
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        common::get_authed(app, &format!("/chats/{chat_id}/pinned-message"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}
