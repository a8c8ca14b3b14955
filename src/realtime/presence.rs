//! Per-user presence aggregation: detects online/offline transitions across
//! a user's connections and broadcasts them filtered by the user's
//! `last_seen_visibility` setting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::broker::{self, Broker};
use crate::db;
use crate::realtime::protocol;
use crate::realtime::registry::SubscriptionRegistry;

pub struct PresenceAggregator {
    pool: PgPool,
    registry: Arc<SubscriptionRegistry>,
    broker: Arc<Broker>,
}

impl PresenceAggregator {
    pub fn new(pool: PgPool, registry: Arc<SubscriptionRegistry>, broker: Arc<Broker>) -> Self {
        PresenceAggregator { pool, registry, broker }
    }

    /// Called after a new session attaches. If it was the user's first
    /// active session, broadcasts `online`.
    pub async fn on_attached(&self, user_id: i64, became_first_active: bool) {
        if became_first_active {
            self.broadcast(user_id, "online").await;
        }
    }

    /// Called when a session's active bit flips or it disconnects. Compares
    /// against the registry's current state to detect the online/offline
    /// edge rather than trusting the caller's local view.
    pub async fn on_activity_changed(&self, user_id: i64) {
        let still_active = self.registry.user_has_active_session(user_id).await;
        if !still_active {
            let _ = db::users::touch_last_activity(&self.pool, user_id).await;
            self.broadcast(user_id, "offline").await;
        } else {
            self.broadcast(user_id, "online").await;
        }
    }

    /// Called after a session fully detaches (close or error).
    pub async fn on_detached(&self, user_id: i64) {
        let still_active = self.registry.user_has_active_session(user_id).await;
        if !still_active {
            let _ = db::users::touch_last_activity(&self.pool, user_id).await;
            self.broadcast(user_id, "offline").await;
        }
    }

    async fn broadcast(&self, user_id: i64, status: &str) {
        let visibility = match db::settings::get_or_default(&self.pool, user_id).await {
            Ok(settings) => settings.last_seen_visibility,
            Err(_) => return,
        };

        let chat_ids = match db::chats::chats_for_user(&self.pool, user_id).await {
            Ok(ids) => ids,
            Err(_) => return,
        };

        if visibility == "everyone" {
            let payload = protocol::presence_full(user_id, status);
            let bytes = serde_json::to_vec(&payload).unwrap_or_default();
            for chat_id in chat_ids {
                self.broker.publish(&broker::chat_channel(chat_id), &bytes).await;
            }
            return;
        }

        // Non-default visibility is resolved per viewer and never crosses
        // the broker: a cross-process viewer of a privacy-restricted user
        // receives nothing, which is an accepted design cost.
        let bucket = if status == "online" {
            "online".to_string()
        } else {
            let last_activity = db::users::last_activity(&self.pool, user_id).await.ok().flatten();
            last_seen_bucket(last_activity)
        };

        for chat_id in chat_ids {
            let visibility = visibility.clone();
            let bucket = bucket.clone();
            let status = status.to_string();
            self.registry
                .local_fanout_chat_per_viewer(chat_id, move |handle| {
                    let payload = if handle.user_id == user_id || handle.is_admin {
                        protocol::presence_full(user_id, &status)
                    } else {
                        match visibility.as_str() {
                            "approx_only" => protocol::presence_approx(user_id, &bucket),
                            _ => return None, // nobody
                        }
                    };
                    serde_json::to_vec(&payload).ok()
                })
                .await;
        }
    }
}

fn last_seen_bucket(last_activity: Option<DateTime<Utc>>) -> String {
    let Some(last_activity) = last_activity else {
        return "long ago".to_string();
    };
    let elapsed = Utc::now() - last_activity;
    if elapsed <= chrono::Duration::minutes(5) {
        "just now".to_string()
    } else if elapsed <= chrono::Duration::hours(1) {
        "within an hour".to_string()
    } else if elapsed <= chrono::Duration::days(1) {
        "today".to_string()
    } else if elapsed <= chrono::Duration::days(7) {
        "this week".to_string()
    } else {
        "long ago".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_thresholds_match_expected_labels() {
        let now = Utc::now();
        assert_eq!(last_seen_bucket(Some(now)), "just now");
        assert_eq!(last_seen_bucket(Some(now - chrono::Duration::minutes(30))), "within an hour");
        assert_eq!(last_seen_bucket(Some(now - chrono::Duration::hours(12))), "today");
        assert_eq!(last_seen_bucket(Some(now - chrono::Duration::days(3))), "this week");
        assert_eq!(last_seen_bucket(Some(now - chrono::Duration::days(30))), "long ago");
        assert_eq!(last_seen_bucket(None), "long ago");
    }
}
