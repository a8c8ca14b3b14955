use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::auth::{self, TokenType};
use crate::authz;
use crate::broker;
use crate::db;
use crate::realtime::protocol::{self, InboundFrame, PresenceStatus};
use crate::realtime::registry::{self, ConnectionHandle};
use crate::realtime::session::Session;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = state.next_connection_id();
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = registry::channel();

    let writer = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => continue,
            };
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(connection_id);
    let mut username_cache: Option<String> = None;

    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => {
                let frame: Result<InboundFrame, _> = serde_json::from_str(&text);
                match frame {
                    Ok(frame) => {
                        if !process_frame(&state, &mut session, &tx, &mut username_cache, frame).await {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(component = "realtime", error = ?e, "unrecognized frame");
                        send(&tx, protocol::error_frame("unrecognized frame"));
                    }
                }
            }
            Message::Binary(_) => {
                send(&tx, protocol::error_frame("binary frames are not supported"));
            }
            // axum answers transport-level pings with a pong automatically;
            // nothing to do here beyond keeping the loop alive.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }

    state.registry.detach(connection_id).await;
    if let Some(user_id) = session.user_id {
        state.presence.on_detached(user_id).await;
    }
    writer.abort();
}

/// Returns false if the connection should be closed.
async fn process_frame(
    state: &AppState,
    session: &mut Session,
    tx: &tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    username_cache: &mut Option<String>,
    frame: InboundFrame,
) -> bool {
    if !session.is_authenticated() {
        return match frame {
            InboundFrame::Auth { token, active } => {
                handle_auth(state, session, tx, username_cache, &token, active).await
            }
            _ => {
                send(tx, protocol::error_frame("must authenticate first"));
                false
            }
        };
    }

    match frame {
        InboundFrame::Auth { .. } => {
            send(tx, protocol::error_frame("already authenticated"));
        }
        InboundFrame::Subscribe { chat_id } => handle_subscribe(state, session, tx, chat_id).await,
        InboundFrame::Typing { chat_id } => handle_typing(state, session, username_cache, chat_id).await,
        InboundFrame::PresenceUpdate { status } => handle_presence_update(state, session, status).await,
        InboundFrame::Ping { active } => handle_ping(state, session, tx, active).await,
    }
    true
}

async fn handle_auth(
    state: &AppState,
    session: &mut Session,
    tx: &tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    username_cache: &mut Option<String>,
    token: &str,
    active: bool,
) -> bool {
    let claims = match auth::validate_token(token, &state.jwt_secret) {
        Ok(claims) => claims,
        Err(_) => {
            send(tx, protocol::error_frame("invalid or expired token"));
            return false;
        }
    };

    if claims.token_type != TokenType::Access {
        send(tx, protocol::error_frame("invalid token type"));
        return false;
    }

    let user_id = match claims.user_id() {
        Ok(id) => id,
        Err(_) => {
            send(tx, protocol::error_frame("invalid token subject"));
            return false;
        }
    };

    session.authenticate(user_id, claims.is_admin, active);

    if let Ok(Some(user)) = db::users::get_by_id(&state.pool, user_id).await {
        *username_cache = Some(user.display_name.unwrap_or(user.username));
    }

    let handle = ConnectionHandle::with_active_flag(
        session.connection_id,
        user_id,
        claims.is_admin,
        session.active_flag.clone(),
        tx.clone(),
    );
    let became_first_active = state.registry.attach_user(user_id, handle).await;

    let registry = state.registry.clone();
    let user_channel = broker::user_channel(user_id);
    state
        .broker
        .subscribe(
            &user_channel,
            std::sync::Arc::new(move |payload| {
                let registry = registry.clone();
                let user_id = user_id;
                tokio::spawn(async move {
                    registry.local_fanout_user(user_id, &payload).await;
                });
            }),
        )
        .await;

    let _ = db::users::touch_last_activity(&state.pool, user_id).await;
    state.presence.on_attached(user_id, became_first_active).await;

    send(tx, protocol::auth_ok(user_id));
    true
}

async fn handle_subscribe(state: &AppState, session: &mut Session, tx: &tokio::sync::mpsc::UnboundedSender<Vec<u8>>, chat_id: i64) {
    let Some(user_id) = session.user_id else { return };

    if !authz::is_member(&state.pool, chat_id, user_id).await {
        send(tx, protocol::error_frame("not a member of this chat"));
        return;
    }

    session.add_subscription(chat_id);

    let handle = ConnectionHandle::with_active_flag(
        session.connection_id,
        user_id,
        session.is_admin,
        session.active_flag.clone(),
        tx.clone(),
    );
    state.registry.attach_chat(chat_id, handle).await;

    let registry = state.registry.clone();
    let chat_channel = broker::chat_channel(chat_id);
    state
        .broker
        .subscribe(
            &chat_channel,
            std::sync::Arc::new(move |payload| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.local_fanout_chat(chat_id, &payload).await;
                });
            }),
        )
        .await;

    send(tx, protocol::subscribed(chat_id));
}

async fn handle_typing(state: &AppState, session: &Session, username_cache: &Option<String>, chat_id: i64) {
    let Some(user_id) = session.user_id else { return };
    if !session.subscribed_chats.contains(&chat_id) {
        return;
    }
    let username = username_cache.clone().unwrap_or_default();
    let payload = protocol::typing(chat_id, user_id, &username);
    if let Ok(bytes) = serde_json::to_vec(&payload) {
        state.broker.publish(&broker::chat_channel(chat_id), &bytes).await;
    }
}

async fn handle_presence_update(state: &AppState, session: &mut Session, status: PresenceStatus) {
    let Some(user_id) = session.user_id else { return };
    let active = status == PresenceStatus::Active;
    if session.set_active(active) {
        state.presence.on_activity_changed(user_id).await;
    }
}

async fn handle_ping(state: &AppState, session: &mut Session, tx: &tokio::sync::mpsc::UnboundedSender<Vec<u8>>, active: Option<bool>) {
    send(tx, protocol::pong());

    let Some(user_id) = session.user_id else { return };

    if active == Some(true) {
        if session.should_touch_last_activity() {
            let _ = db::users::touch_last_activity(&state.pool, user_id).await;
        }
        if session.set_active(true) {
            state.presence.on_activity_changed(user_id).await;
        }
    }
}

fn send(tx: &tokio::sync::mpsc::UnboundedSender<Vec<u8>>, payload: serde_json::Value) {
    if let Ok(bytes) = serde_json::to_vec(&payload) {
        let _ = tx.send(bytes);
    } else {
        warn!(component = "realtime", "failed to serialize outbound frame");
    }
}
