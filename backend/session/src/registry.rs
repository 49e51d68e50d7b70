//! Shared in-memory session table.
//!
//! The lock is held only for map operations, never across provider calls or
//! any other I/O. Removal is the commit point for teardown: whichever caller
//! gets `Some` back owns the record and is the only one allowed to release
//! the backing sandbox.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use dockhand_core::{SessionId, SessionRecord};

/// Concurrent map of live sessions, shared across the HTTP surface, the
/// relay, and the reclaimer.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: SessionRecord) {
        self.sessions.write().await.insert(record.id, record);
    }

    pub async fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Bump `last_active_at` to now. Returns whether the session exists.
    ///
    /// The timestamp only moves forward; a stale touch racing a newer one
    /// never rewinds the clock.
    pub async fn touch(&self, id: &SessionId) -> bool {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(record) => {
                if now > record.last_active_at {
                    record.last_active_at = now;
                }
                true
            }
            None => false,
        }
    }

    /// Remove the session outright. `Some` means this caller won the record.
    pub async fn remove(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.write().await.remove(id)
    }

    /// Remove the session only if `user_id` owns it. Absent and foreign-owned
    /// sessions both yield `None`; the caller cannot tell them apart.
    pub async fn remove_if_owner(&self, id: &SessionId, user_id: i64) -> Option<SessionRecord> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(record) if record.owner.user_id == user_id => sessions.remove(id),
            _ => None,
        }
    }

    /// Remove the session only if it has been idle longer than `budget`.
    ///
    /// The idle check and the removal happen under one write lock, so a
    /// touch that lands first saves the session and a touch that lands after
    /// finds it gone.
    pub async fn remove_if_idle(&self, id: &SessionId, budget: Duration) -> Option<SessionRecord> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get(id) {
            Some(record) => {
                let idle = now - record.last_active_at;
                if idle.num_milliseconds() > budget.as_millis() as i64 {
                    sessions.remove(id)
                } else {
                    None
                }
            }
            None => None,
        }
    }

    /// Ids of every live session, for sweep iteration outside the lock.
    pub async fn snapshot_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Empty the table, handing every record to the caller.
    pub async fn drain(&self) -> Vec<SessionRecord> {
        let mut sessions = self.sessions.write().await;
        sessions.drain().map(|(_, record)| record).collect()
    }

    #[cfg(test)]
    pub(crate) async fn force_last_active(&self, id: &SessionId, at: chrono::DateTime<Utc>) {
        if let Some(record) = self.sessions.write().await.get_mut(id) {
            record.last_active_at = at;
        }
    }
}
