//! Cross-process pub/sub fan-out over Redis. Falls back to direct in-process
//! delivery when no broker URL is configured or the broker is unreachable, so
//! a single-node deployment keeps working without Redis.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub fn chat_channel(chat_id: i64) -> String {
    format!("chat:{chat_id}")
}

pub fn user_channel(user_id: i64) -> String {
    format!("user:{user_id}")
}

/// Serializes and publishes an envelope, dropping the result on a
/// serialization failure (which should never happen for our own DTOs).
pub async fn publish_envelope(broker: &Broker, channel: &str, envelope: &serde_json::Value) {
    if let Ok(bytes) = serde_json::to_vec(envelope) {
        broker.publish(channel, &bytes).await;
    }
}

type LocalHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

pub struct Broker {
    client: Option<Client>,
    publisher: Mutex<Option<ConnectionManager>>,
    subscribed_channels: Mutex<HashSet<String>>,
    local_handlers: Mutex<HashMap<String, Vec<LocalHandler>>>,
}

impl Broker {
    /// `broker_url` of `None` (or an unreachable Redis) puts the broker into
    /// local-only mode: publishes are delivered straight to in-process
    /// handlers registered via `subscribe`.
    pub async fn connect(broker_url: Option<&str>) -> Self {
        let client = broker_url.and_then(|url| match Client::open(url) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(component = "broker", error = ?e, "invalid broker URL, running local-only");
                None
            }
        });

        let publisher = match &client {
            Some(client) => match client.get_connection_manager().await {
                Ok(manager) => Some(manager),
                Err(e) => {
                    warn!(component = "broker", error = ?e, "broker unreachable at startup, running local-only");
                    None
                }
            },
            None => None,
        };

        if publisher.is_some() {
            info!(component = "broker", "connected to broker");
        }

        Broker {
            client,
            publisher: Mutex::new(publisher),
            subscribed_channels: Mutex::new(HashSet::new()),
            local_handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Fire-and-forget publish. Errors are logged, never propagated — a lost
    /// event is remedied by the next state-fetching read, per the
    /// at-least-once delivery model handlers are built to tolerate.
    pub async fn publish(&self, channel: &str, payload: &[u8]) {
        let mut guard = self.publisher.lock().await;
        if let Some(manager) = guard.as_mut() {
            let mut manager = manager.clone();
            match manager.publish::<_, _, ()>(channel, payload).await {
                Ok(()) => return,
                Err(e) => {
                    error!(component = "broker", channel, error = ?e, "publish failed, delivering local-only");
                }
            }
        }
        drop(guard);
        self.deliver_local(channel, payload).await;
    }

    /// Registers a handler for `channel`. Idempotent per-channel Redis
    /// subscription: the first call for a given channel spawns the
    /// subscriber task, later calls just add another local handler.
    pub async fn subscribe(self: &Arc<Self>, channel: &str, handler: LocalHandler) {
        {
            let mut handlers = self.local_handlers.lock().await;
            handlers.entry(channel.to_string()).or_default().push(handler);
        }

        let mut subscribed = self.subscribed_channels.lock().await;
        if subscribed.contains(channel) {
            return;
        }
        subscribed.insert(channel.to_string());
        drop(subscribed);

        let Some(client) = self.client.clone() else {
            return;
        };

        let broker = Arc::clone(self);
        let channel = channel.to_string();
        tokio::spawn(async move {
            broker.run_subscription(client, channel).await;
        });
    }

    async fn run_subscription(&self, client: Client, channel: String) {
        let pubsub_conn = match client.get_async_pubsub().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(component = "broker", channel = %channel, error = ?e, "subscribe failed, local-only for this channel");
                self.subscribed_channels.lock().await.remove(&channel);
                return;
            }
        };

        let mut pubsub = pubsub_conn;
        if let Err(e) = pubsub.subscribe(&channel).await {
            error!(component = "broker", channel = %channel, error = ?e, "subscribe failed, local-only for this channel");
            self.subscribed_channels.lock().await.remove(&channel);
            return;
        }

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: Vec<u8> = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    error!(component = "broker", channel = %channel, error = ?e, "failed to decode message payload");
                    continue;
                }
            };
            self.deliver_local(&channel, &payload).await;
        }
    }

    async fn deliver_local(&self, channel: &str, payload: &[u8]) {
        let handlers = self.local_handlers.lock().await;
        if let Some(channel_handlers) = handlers.get(channel) {
            for handler in channel_handlers {
                handler(payload.to_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn connect_with_no_url_runs_local_only() {
        let broker = Broker::connect(None).await;
        assert!(broker.client.is_none());
        assert!(broker.publisher.lock().await.is_none());
    }

    #[tokio::test]
    async fn publish_with_no_broker_delivers_to_local_subscribers() {
        let broker = Arc::new(Broker::connect(None).await);
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        broker
            .subscribe("chat:1", Arc::new(move |_payload| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        broker.publish("chat:1", b"hello").await;

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_only_reaches_subscribers_of_the_same_channel() {
        let broker = Arc::new(Broker::connect(None).await);
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        broker
            .subscribe("chat:1", Arc::new(move |_payload| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        broker.publish("chat:2", b"hello").await;

        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_envelope_fans_out_serialized_payload() {
        let broker = Broker::connect(None).await;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        broker
            .subscribe("user:7", Arc::new(move |payload| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    sink.lock().await.push(payload);
                });
            }))
            .await;

        publish_envelope(&broker, "user:7", &serde_json::json!({ "type": "ping" })).await;
        tokio::task::yield_now().await;

        let guard = received.lock().await;
        assert_eq!(guard.len(), 1);
        let parsed: serde_json::Value = serde_json::from_slice(&guard[0]).unwrap();
        assert_eq!(parsed["type"], "ping");
    }
}
