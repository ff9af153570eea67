//! Live sessions, keyed by id.
//!
//! The map lock is only held for lookups and inserts; per-session work takes
//! the session's own mutex after the map lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use agora_core::{SessionId, SessionStatus};

use crate::session::SessionState;

pub(crate) type SharedSession = Arc<Mutex<SessionState>>;

#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
}

impl SessionRegistry {
    pub fn get(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions.read().get(id).cloned()
    }

    pub fn insert(&self, state: SessionState) -> SharedSession {
        let id = state.id.clone();
        let shared = Arc::new(Mutex::new(state));
        let _ = self.sessions.write().insert(id, Arc::clone(&shared));
        shared
    }

    /// Insert unless present. The flag is `true` when `make` was used.
    pub fn get_or_insert_with(
        &self,
        id: &SessionId,
        make: impl FnOnce() -> SessionState,
    ) -> (SharedSession, bool) {
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(id) {
            return (Arc::clone(existing), false);
        }
        let shared = Arc::new(Mutex::new(make()));
        let _ = sessions.insert(id.clone(), Arc::clone(&shared));
        (shared, true)
    }

    pub fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions.write().remove(id)
    }

    pub fn all(&self) -> Vec<SharedSession> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Oldest `waiting` session with a free slot, by creation time.
    pub fn find_open(&self) -> Option<SharedSession> {
        let mut open: Vec<(String, SessionId, SharedSession)> = self
            .all()
            .into_iter()
            .filter_map(|shared| {
                let state = shared.lock();
                let joinable = state.status == SessionStatus::Waiting
                    && !state.finalizing
                    && !state.is_full();
                let key = (state.created_at.clone(), state.id.clone());
                drop(state);
                joinable.then(|| (key.0, key.1, shared))
            })
            .collect();
        open.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        open.into_iter().next().map(|(_, _, shared)| shared)
    }

    pub fn count_with_status(&self, status: SessionStatus) -> usize {
        self.all()
            .iter()
            .filter(|s| s.lock().status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{active_state, waiting_state};

    #[test]
    fn find_open_prefers_oldest() {
        let registry = SessionRegistry::default();
        let mut newer = waiting_state(3);
        newer.created_at = "2026-01-02T00:00:00.000Z".into();
        let mut older = waiting_state(3);
        older.created_at = "2026-01-01T00:00:00.000Z".into();
        let older_id = older.id.clone();
        let _ = registry.insert(newer);
        let _ = registry.insert(older);
        let _ = registry.insert(active_state(3));

        let found = registry.find_open().unwrap();
        assert_eq!(found.lock().id, older_id);
        assert_eq!(registry.count_with_status(SessionStatus::Active), 1);
    }

    #[test]
    fn find_open_skips_full_sessions() {
        let registry = SessionRegistry::default();
        let mut full = active_state(3);
        full.status = SessionStatus::Waiting;
        let _ = registry.insert(full);
        assert!(registry.find_open().is_none());
    }

    #[test]
    fn get_or_insert_keeps_existing() {
        let registry = SessionRegistry::default();
        let state = waiting_state(2);
        let id = state.id.clone();
        let _ = registry.insert(state);
        let (_, inserted) = registry.get_or_insert_with(&id, || waiting_state(9));
        assert!(!inserted);
        assert_eq!(registry.get(&id).unwrap().lock().total_rounds, 2);
        assert!(registry.remove(&id).is_some());
        assert_eq!(registry.len(), 0);
    }
}
