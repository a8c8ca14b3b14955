use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sqlx::PgPool;

use crate::broker::Broker;
use crate::config::Config;
use crate::realtime::presence::PresenceAggregator;
use crate::realtime::registry::SubscriptionRegistry;

/// Shared application state passed to all handlers and extractors.
///
/// Cheap to clone: the registry, presence aggregator, broker, and config are
/// all `Arc`-wrapped internally.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt_secret: Arc<str>,
    pub registry: Arc<SubscriptionRegistry>,
    pub presence: Arc<PresenceAggregator>,
    pub broker: Arc<Broker>,
    next_connection_id: Arc<AtomicU64>,
}

impl AppState {
    pub async fn new(pool: PgPool, config: Config) -> Self {
        let config = Arc::new(config);
        let jwt_secret: Arc<str> = Arc::from(config.jwt_secret.as_str());
        let registry = Arc::new(SubscriptionRegistry::new());
        let broker = Arc::new(Broker::connect(config.broker_url.as_deref()).await);
        let presence = Arc::new(PresenceAggregator::new(
            pool.clone(),
            Arc::clone(&registry),
            Arc::clone(&broker),
        ));

        AppState {
            pool,
            config,
            jwt_secret,
            registry,
            presence,
            broker,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}
