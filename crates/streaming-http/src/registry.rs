use std::sync::Arc;

use dashmap::DashMap;

use crate::identifier::RequestId;
use crate::session::RequestSession;

/// Identifier -> live session. At most one session per identifier.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<RequestId, Arc<RequestSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `session`, returning whatever was registered under its id before.
    pub fn insert(&self, session: Arc<RequestSession>) -> Option<Arc<RequestSession>> {
        self.sessions.insert(session.id().clone(), session)
    }

    pub fn get(&self, id: &RequestId) -> Option<Arc<RequestSession>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &RequestId) -> Option<Arc<RequestSession>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Removes the entry for `session`'s id only if it is still `session`.
    ///
    /// A late teardown of a preempted session must not evict its successor.
    pub fn remove_if_same(&self, session: &Arc<RequestSession>) -> bool {
        self.sessions
            .remove_if(session.id(), |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Removes and returns every session.
    pub fn drain(&self) -> Vec<Arc<RequestSession>> {
        let ids: Vec<RequestId> = self.ids();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn ids(&self) -> Vec<RequestId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
