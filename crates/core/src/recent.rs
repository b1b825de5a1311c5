//! "New item" badges that expire after a fixed window.
//!
//! Freshly created summaries, tasks, and notifications are highlighted
//! for a short time. An item marked at `t` is new for every `now` with
//! `now - t < ttl` and expired from `now - t == ttl` onward.

use std::collections::HashMap;

use chrono::Duration;

use crate::types::Timestamp;

/// Default lifetime of a "new" badge, in seconds (5 minutes).
pub const NEW_ITEM_TTL_SECS: i64 = 300;

/// Whether an item marked at `marked_at` has expired at `now`.
pub fn is_expired(marked_at: Timestamp, now: Timestamp, ttl: Duration) -> bool {
    now - marked_at >= ttl
}

/// Tracks which item ids are currently "new".
#[derive(Debug, Clone)]
pub struct RecentItems {
    ttl: Duration,
    marked: HashMap<String, Timestamp>,
}

impl RecentItems {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(NEW_ITEM_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            marked: HashMap::new(),
        }
    }

    /// Mark `id` as new starting at `at`. Re-marking restarts the window.
    pub fn mark_new(&mut self, id: impl Into<String>, at: Timestamp) {
        self.marked.insert(id.into(), at);
    }

    pub fn is_new(&self, id: &str, now: Timestamp) -> bool {
        self.marked
            .get(id)
            .is_some_and(|&at| !is_expired(at, now, self.ttl))
    }

    /// Explicitly clear the badge, e.g. once the user opened the item.
    pub fn dismiss(&mut self, id: &str) -> bool {
        self.marked.remove(id).is_some()
    }

    /// Drop expired entries and return how many were removed.
    pub fn prune(&mut self, now: Timestamp) -> usize {
        let before = self.marked.len();
        let ttl = self.ttl;
        self.marked.retain(|_, at| !is_expired(*at, now, ttl));
        before - self.marked.len()
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }
}

impl Default for RecentItems {
    fn default() -> Self {
        Self::new()
    }
}
