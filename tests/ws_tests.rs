//! Real-socket coverage for `/ws` — the oneshot harness in `tests/common`
//! cannot drive a WebSocket upgrade, so these tests bind a real `TcpListener`
//! and talk to it with `tokio-tungstenite` (and `reqwest` for the HTTP side
//! of the fan-out test, since both must share one `AppState`).

mod common;

use std::time::Duration;

use courier_server::auth;
use courier_server::config::Config;
use courier_server::state::AppState;
use courier_server::{db, realtime};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        db_pool_size: 5,
        broker_url: None,
        object_store_endpoint: None,
        object_store_bucket: "courier-test-files".to_string(),
        object_store_access_key: None,
        object_store_secret_key: None,
        object_store_public_url: "http://localhost:9000".to_string(),
        presign_ttl_seconds: 900,
        upload_dir: common::test_upload_dir(),
        jwt_secret: common::TEST_JWT_SECRET.to_string(),
        jwt_access_ttl_minutes: 15,
        jwt_refresh_ttl_minutes: 60 * 24 * 30,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        max_file_size_mb: 50,
        is_dev: true,
        allowed_origins: Vec::new(),
    }
}

/// Binds the full HTTP + `/ws` router to an ephemeral port and returns its base URL.
async fn spawn_server(pool: PgPool) -> String {
    let state = AppState::new(pool, test_config()).await;
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(realtime::ws::ws_handler))
        .route(
            "/chats/:id/messages",
            axum::routing::post(courier_server::handlers::messages::create),
        )
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn make_user(pool: &PgPool) -> (i64, String) {
    let username = common::unique_username();
    let hash = auth::hash_password("password123").unwrap();
    let user = db::users::insert(pool, &username, &format!("{username}@example.test"), &hash, None)
        .await
        .unwrap();
    let token = auth::create_access_token(user.id, false, common::TEST_JWT_SECRET, 15).unwrap();
    (user.id, token)
}

/// Creates a group chat owned by a fresh user and adds a fresh member with
/// the given role; returns `(chat_id, owner_token, member_id, member_token)`.
async fn make_chat_with_member(pool: &PgPool, member_role: &str) -> (i64, String, i64, String) {
    let (owner_id, owner_token) = make_user(pool).await;
    let chat = db::chats::insert(pool, "group", Some("WS Room"), None, owner_id).await.unwrap();
    db::chats::insert_membership(pool, chat.id, owner_id, "owner").await.unwrap();

    let (member_id, member_token) = make_user(pool).await;
    db::chats::insert_membership(pool, chat.id, member_id, member_role).await.unwrap();

    (chat.id, owner_token, member_id, member_token)
}

async fn recv_frame(stream: &mut WsStream) -> Value {
    let msg = timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream closed unexpectedly")
        .expect("websocket error");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn auth_then_subscribe_succeeds_for_member() {
    let pool = common::test_pool().await;
    let base_url = spawn_server(pool.clone()).await;

    let (chat_id, _owner_token, member_id, member_token) = make_chat_with_member(&pool, "member").await;

    let ws_url = format!("{}/ws", base_url.replacen("http", "ws", 1));
    let (mut socket, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();

    socket
        .send(Message::Text(json!({ "type": "auth", "token": member_token }).to_string()))
        .await
        .unwrap();
    let ack = recv_frame(&mut socket).await;
    assert_eq!(ack["type"], "auth_ok");
    assert_eq!(ack["user_id"], member_id);

    socket
        .send(Message::Text(json!({ "type": "subscribe", "chat_id": chat_id }).to_string()))
        .await
        .unwrap();
    let ack = recv_frame(&mut socket).await;
    assert_eq!(ack["type"], "subscribed");
    assert_eq!(ack["chat_id"], chat_id);

    socket.close(None).await.ok();
}

#[tokio::test]
async fn subscribe_to_a_chat_you_are_not_in_is_rejected() {
    let pool = common::test_pool().await;
    let base_url = spawn_server(pool.clone()).await;

    let (chat_id, _owner_token, _member_id, _member_token) = make_chat_with_member(&pool, "member").await;
    let (_, outsider_token) = make_user(&pool).await;

    let ws_url = format!("{}/ws", base_url.replacen("http", "ws", 1));
    let (mut socket, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    socket
        .send(Message::Text(json!({ "type": "auth", "token": outsider_token }).to_string()))
        .await
        .unwrap();
    let _ = recv_frame(&mut socket).await;

    socket
        .send(Message::Text(json!({ "type": "subscribe", "chat_id": chat_id }).to_string()))
        .await
        .unwrap();
    let reply = recv_frame(&mut socket).await;
    assert_eq!(reply["type"], "error");

    socket.close(None).await.ok();
}

#[tokio::test]
async fn message_created_fans_out_to_subscribed_viewer() {
    let pool = common::test_pool().await;
    let base_url = spawn_server(pool.clone()).await;

    // The owner posts; a second member, subscribed over the socket, should
    // see the fan-out.
    let (chat_id, sender_token, _member_id, _member_token) = make_chat_with_member(&pool, "member").await;
    let sender_id = auth::validate_token(&sender_token, common::TEST_JWT_SECRET).unwrap().user_id().unwrap();
    let (_, viewer_token) = make_user(&pool).await;
    let viewer_id = auth::validate_token(&viewer_token, common::TEST_JWT_SECRET).unwrap().user_id().unwrap();
    db::chats::insert_membership(&pool, chat_id, viewer_id, "member").await.unwrap();

    let ws_url = format!("{}/ws", base_url.replacen("http", "ws", 1));
    let (mut viewer_socket, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    viewer_socket
        .send(Message::Text(json!({ "type": "auth", "token": viewer_token }).to_string()))
        .await
        .unwrap();
    let _ = recv_frame(&mut viewer_socket).await;
    viewer_socket
        .send(Message::Text(json!({ "type": "subscribe", "chat_id": chat_id }).to_string()))
        .await
        .unwrap();
    let _ = recv_frame(&mut viewer_socket).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/chats/{chat_id}/messages"))
        .bearer_auth(sender_token)
        .json(&json!({ "content": "fan-out please", "message_type": "text" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let fanout = recv_frame(&mut viewer_socket).await;
    assert_eq!(fanout["type"], "message");
    assert_eq!(fanout["chat_id"], chat_id);
    assert_eq!(fanout["sender_id"], sender_id);
    assert_eq!(fanout["content"], "fan-out please");

    viewer_socket.close(None).await.ok();
}
