use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::types::PendingAction;

/// Per-session slot holding at most one staged action.
///
/// Implementations must make each call atomic with respect to concurrent
/// callers. A shared cache can back this trait when the service runs as more
/// than one process.
pub trait SessionStore: Send + Sync {
    /// The live action for `session_id`. An expired action is evicted and
    /// reported as absent.
    fn get(&self, session_id: &str) -> Option<PendingAction>;

    /// Stage `action`, replacing whatever the session held.
    fn set(&self, session_id: &str, action: PendingAction);

    /// Drop the session's action, returning it if one was stored.
    fn clear(&self, session_id: &str) -> Option<PendingAction>;

    /// Remove and return the live action in one step, so a confirmation can
    /// run it at most once.
    fn take(&self, session_id: &str) -> Option<PendingAction>;

    /// Evict every action expired at `now`. Returns how many were dropped.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;

    /// Number of stored actions, expired ones included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-process store: a map behind one mutex.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    actions: Mutex<HashMap<String, PendingAction>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingAction>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.actions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str) -> Option<PendingAction> {
        let mut actions = self.lock();
        match actions.get(session_id) {
            Some(action) if action.is_expired_at(Utc::now()) => {
                actions.remove(session_id);
                tracing::debug!(session_id, "pending action expired");
                None
            }
            other => other.cloned(),
        }
    }

    fn set(&self, session_id: &str, action: PendingAction) {
        let previous = self.lock().insert(session_id.to_string(), action);
        if let Some(previous) = previous {
            tracing::debug!(session_id, replaced = %previous.command(), "pending action overwritten");
        }
    }

    fn clear(&self, session_id: &str) -> Option<PendingAction> {
        self.lock().remove(session_id)
    }

    fn take(&self, session_id: &str) -> Option<PendingAction> {
        let action = self.lock().remove(session_id)?;
        if action.is_expired_at(Utc::now()) {
            tracing::debug!(session_id, "pending action expired");
            return None;
        }
        Some(action)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut actions = self.lock();
        let before = actions.len();
        actions.retain(|_, action| !action.is_expired_at(now));
        before - actions.len()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
