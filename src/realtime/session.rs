//! Per-connection session state machine. The Session itself only tracks
//! state; I/O and fan-out wiring live in `realtime::ws`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

pub struct Session {
    pub connection_id: u64,
    state: SessionState,
    pub user_id: Option<i64>,
    pub is_admin: bool,
    /// Shared with every `ConnectionHandle` registered for this connection,
    /// so flipping it here is visible to the registry without a round-trip.
    pub active_flag: Arc<AtomicBool>,
    pub subscribed_chats: HashSet<i64>,
    last_activity_touch: Option<Instant>,
}

/// Minimum spacing between `touch_last_activity` writes triggered by a
/// single session's ping frames.
const LAST_ACTIVITY_THROTTLE_SECS: u64 = 90;

impl Session {
    pub fn new(connection_id: u64) -> Self {
        Session {
            connection_id,
            state: SessionState::Unauthenticated,
            user_id: None,
            is_admin: false,
            active_flag: Arc::new(AtomicBool::new(true)),
            subscribed_chats: HashSet::new(),
            last_activity_touch: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn is_active(&self) -> bool {
        self.active_flag.load(Ordering::Relaxed)
    }

    pub fn authenticate(&mut self, user_id: i64, is_admin: bool, active: bool) {
        self.state = SessionState::Authenticated;
        self.user_id = Some(user_id);
        self.is_admin = is_admin;
        self.active_flag.store(active, Ordering::Relaxed);
    }

    pub fn add_subscription(&mut self, chat_id: i64) {
        self.subscribed_chats.insert(chat_id);
    }

    /// Flips the active bit; returns true if it actually changed.
    pub fn set_active(&mut self, active: bool) -> bool {
        let previous = self.active_flag.swap(active, Ordering::Relaxed);
        previous != active
    }

    /// True if at least `LAST_ACTIVITY_THROTTLE_SECS` has elapsed since the
    /// last write-through triggered from this session (or none has happened
    /// yet). Updates the internal clock as a side effect when it returns true.
    pub fn should_touch_last_activity(&mut self) -> bool {
        let now = Instant::now();
        let should = match self.last_activity_touch {
            None => true,
            Some(last) => now.duration_since(last).as_secs() >= LAST_ACTIVITY_THROTTLE_SECS,
        };
        if should {
            self.last_activity_touch = Some(now);
        }
        should
    }
}
