//! Process-local bookkeeping of which live connections belong to which chat
//! and user. All map mutations are serialized by a single mutex; sends to
//! connections happen from a snapshot taken outside the lock so network I/O
//! never runs while the lock is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

#[derive(Clone)]
pub struct ConnectionHandle {
    pub connection_id: u64,
    pub user_id: i64,
    pub is_admin: bool,
    pub active: Arc<AtomicBool>,
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl ConnectionHandle {
    pub fn new(
        connection_id: u64,
        user_id: i64,
        is_admin: bool,
        active: bool,
        sender: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self::with_active_flag(connection_id, user_id, is_admin, Arc::new(AtomicBool::new(active)), sender)
    }

    /// Shares a single active-flag `Arc` across every handle registered for
    /// the same connection (user map entry and every chat map entry), so
    /// flipping it once is visible everywhere the connection is listed.
    pub fn with_active_flag(
        connection_id: u64,
        user_id: i64,
        is_admin: bool,
        active: Arc<AtomicBool>,
        sender: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        ConnectionHandle {
            connection_id,
            user_id,
            is_admin,
            active,
            sender,
        }
    }

    fn send(&self, payload: &[u8]) -> bool {
        self.sender.send(payload.to_vec()).is_ok()
    }
}

/// Creates the channel a connection's writer task will drain.
pub fn channel() -> (mpsc::UnboundedSender<Vec<u8>>, mpsc::UnboundedReceiver<Vec<u8>>) {
    mpsc::unbounded_channel()
}

#[derive(Default)]
struct Inner {
    by_chat: HashMap<i64, Vec<ConnectionHandle>>,
    by_user: HashMap<i64, Vec<ConnectionHandle>>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if this was the user's first active session (a presence
    /// transition for the caller to act on).
    pub async fn attach_user(&self, user_id: i64, handle: ConnectionHandle) -> bool {
        let mut inner = self.inner.lock().await;
        let entry = inner.by_user.entry(user_id).or_default();
        let was_active_before = entry.iter().any(|h| h.active.load(Ordering::Relaxed));
        entry.push(handle);
        !was_active_before
    }

    pub async fn attach_chat(&self, chat_id: i64, handle: ConnectionHandle) {
        let mut inner = self.inner.lock().await;
        let entry = inner.by_chat.entry(chat_id).or_default();
        if !entry.iter().any(|h| h.connection_id == handle.connection_id) {
            entry.push(handle);
        }
    }

    /// Removes `connection_id` from every map it appears in.
    pub async fn detach(&self, connection_id: u64) {
        let mut inner = self.inner.lock().await;
        for list in inner.by_chat.values_mut() {
            list.retain(|h| h.connection_id != connection_id);
        }
        inner.by_chat.retain(|_, list| !list.is_empty());
        for list in inner.by_user.values_mut() {
            list.retain(|h| h.connection_id != connection_id);
        }
        inner.by_user.retain(|_, list| !list.is_empty());
    }

    /// True if any of the user's remaining sessions are active.
    pub async fn user_has_active_session(&self, user_id: i64) -> bool {
        let inner = self.inner.lock().await;
        inner
            .by_user
            .get(&user_id)
            .map(|list| list.iter().any(|h| h.active.load(Ordering::Relaxed)))
            .unwrap_or(false)
    }

    pub async fn connections_for_user(&self, user_id: i64) -> Vec<ConnectionHandle> {
        let inner = self.inner.lock().await;
        inner.by_user.get(&user_id).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    async fn chat_connection_count(&self, chat_id: i64) -> usize {
        let inner = self.inner.lock().await;
        inner.by_chat.get(&chat_id).map(|l| l.len()).unwrap_or(0)
    }

    pub async fn local_fanout_chat(&self, chat_id: i64, payload: &[u8]) {
        let snapshot = {
            let inner = self.inner.lock().await;
            inner.by_chat.get(&chat_id).cloned().unwrap_or_default()
        };
        self.send_and_prune(snapshot, payload).await;
    }

    pub async fn local_fanout_user(&self, user_id: i64, payload: &[u8]) {
        let snapshot = {
            let inner = self.inner.lock().await;
            inner.by_user.get(&user_id).cloned().unwrap_or_default()
        };
        self.send_and_prune(snapshot, payload).await;
    }

    /// Per-viewer fan-out: `build_payload` sees each connection's identity
    /// and returns `None` to skip it entirely (used for `nobody` visibility).
    pub async fn local_fanout_chat_per_viewer(
        &self,
        chat_id: i64,
        build_payload: impl Fn(&ConnectionHandle) -> Option<Vec<u8>>,
    ) {
        let snapshot = {
            let inner = self.inner.lock().await;
            inner.by_chat.get(&chat_id).cloned().unwrap_or_default()
        };
        let mut dead = Vec::new();
        for handle in &snapshot {
            if let Some(payload) = build_payload(handle) {
                if !handle.send(&payload) {
                    dead.push(handle.connection_id);
                }
            }
        }
        if !dead.is_empty() {
            let mut inner = self.inner.lock().await;
            for list in inner.by_chat.values_mut() {
                list.retain(|h| !dead.contains(&h.connection_id));
            }
            for list in inner.by_user.values_mut() {
                list.retain(|h| !dead.contains(&h.connection_id));
            }
        }
    }

    async fn send_and_prune(&self, snapshot: Vec<ConnectionHandle>, payload: &[u8]) {
        let mut dead = Vec::new();
        for handle in &snapshot {
            if !handle.send(payload) {
                dead.push(handle.connection_id);
            }
        }
        if !dead.is_empty() {
            let mut inner = self.inner.lock().await;
            for list in inner.by_chat.values_mut() {
                list.retain(|h| !dead.contains(&h.connection_id));
            }
            for list in inner.by_user.values_mut() {
                list.retain(|h| !dead.contains(&h.connection_id));
            }
        }
    }
}

#[cfg(test)]
fn new_connection(
    connection_id: u64,
    user_id: i64,
    is_admin: bool,
    active: bool,
) -> (ConnectionHandle, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = channel();
    (ConnectionHandle::new(connection_id, user_id, is_admin, active, tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attach_user_reports_first_active_session() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = new_connection(1, 10, false, true);
        assert!(registry.attach_user(10, handle).await);

        let (handle2, _rx2) = new_connection(2, 10, false, true);
        assert!(!registry.attach_user(10, handle2).await);
    }

    #[tokio::test]
    async fn attach_chat_is_idempotent_for_same_connection() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = new_connection(1, 10, false, true);
        registry.attach_chat(5, handle.clone()).await;
        registry.attach_chat(5, handle).await;

        let snapshot = registry.connections_for_user(10).await;
        assert!(snapshot.is_empty()); // not attached to user map here
    }

    #[tokio::test]
    async fn detach_removes_from_all_maps() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = new_connection(1, 10, false, true);
        registry.attach_user(10, handle.clone()).await;
        registry.attach_chat(5, handle).await;

        registry.detach(1).await;

        assert!(registry.connections_for_user(10).await.is_empty());
        assert!(!registry.user_has_active_session(10).await);
    }

    #[tokio::test]
    async fn fanout_prunes_dead_connections() {
        let registry = SubscriptionRegistry::new();
        let (handle, rx) = new_connection(1, 10, false, true);
        registry.attach_chat(5, handle).await;
        drop(rx);

        assert_eq!(registry.chat_connection_count(5).await, 1);
        registry.local_fanout_chat(5, b"{}").await;
        assert_eq!(registry.chat_connection_count(5).await, 0);
    }
}
