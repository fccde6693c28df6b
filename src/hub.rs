//! Registry of live sessions and event fan-out.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    event::Event,
    filter::Candidate,
    session::{Session, SessionId},
};

/// Process-wide set of connected sessions.
#[derive(Default)]
pub struct Hub {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<Session>) {
        debug!(id = session.id(), remote = session.remote(), "session registered");
        self.sessions.write().insert(session.id(), session);
    }

    /// Forget a session. Unknown ids are ignored.
    pub fn deregister(&self, id: SessionId) {
        if self.sessions.write().remove(&id).is_some() {
            debug!(id, "session deregistered");
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Deliver `ev` to every session except `from`.
    ///
    /// Works on a snapshot taken up front: sessions joining meanwhile may miss
    /// the event, sessions that close meanwhile deliver nothing. Returns the
    /// number of matching subscriptions.
    pub fn broadcast(&self, from: SessionId, ev: &Event) -> usize {
        let snapshot: Vec<Arc<Session>> = self
            .sessions
            .read()
            .iter()
            .filter(|(id, _)| **id != from)
            .map(|(_, s)| s.clone())
            .collect();
        let cand = Candidate::new(ev);
        snapshot.iter().map(|s| s.deliver(&cand)).sum()
    }
}
