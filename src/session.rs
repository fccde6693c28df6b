//! Per-connection subscription state.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use parking_lot::RwLock;
use tokio::sync::{
    mpsc::{error::TrySendError, Sender},
    Notify,
};
use tracing::{debug, info, warn};

use crate::{
    filter::{Candidate, Filter},
    hub::Hub,
    message::{ClientMessage, RelayMessage},
    validate::Validator,
};

pub type SessionId = u64;

/// Messages a session may have queued for its client before it is dropped.
pub const OUTBOUND_CAPACITY: usize = 1024;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One live client connection.
///
/// Only the connection's own inbound loop calls [`Session::handle`], so the
/// subscription table has a single writer. Other connections read it through
/// [`Session::deliver`] while broadcasting, hence the lock. Everything sent to
/// the client goes through `outbound`, a bounded queue drained by one writer
/// task. A client that lets the queue fill up is closed.
pub struct Session {
    id: SessionId,
    remote: String,
    subs: RwLock<HashMap<String, Vec<Filter>>>,
    outbound: Sender<RelayMessage>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl Session {
    pub fn new(remote: impl Into<String>, outbound: Sender<RelayMessage>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            remote: remote.into(),
            subs: RwLock::new(HashMap::new()),
            outbound,
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address label, for logs only.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.read().len()
    }

    /// Resolves once the session has been closed.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.shutdown.notified().await;
    }

    /// Process one inbound text frame.
    pub fn handle(&self, text: &str, hub: &Hub, validator: &Validator) {
        if self.is_closed() {
            return;
        }
        let msg = match ClientMessage::decode(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(remote = %self.remote, "rejecting frame: {e}");
                self.send(RelayMessage::Notice(e.to_string()));
                return;
            }
        };
        match msg {
            ClientMessage::Event(ev) => match validator.admit(&ev) {
                Ok(()) => {
                    let delivered = hub.broadcast(self.id, &ev);
                    info!(
                        remote = %self.remote,
                        id = %ev.id,
                        kind = ev.kind,
                        delivered,
                        "event accepted"
                    );
                    self.send(RelayMessage::ok(ev.id, true, ""));
                }
                Err(e) => {
                    debug!(remote = %self.remote, id = %ev.id, "event rejected: {e}");
                    self.send(RelayMessage::ok(ev.id, false, e.to_string()));
                }
            },
            ClientMessage::Req { sub_id, filters } => {
                info!(remote = %self.remote, sub = %sub_id, "opening subscription");
                self.subs.write().insert(sub_id.clone(), filters);
                // nothing is stored, so the stored set ends immediately
                self.send(RelayMessage::Eose(sub_id));
            }
            ClientMessage::Close(sub_id) => {
                if self.subs.write().remove(&sub_id).is_some() {
                    info!(remote = %self.remote, sub = %sub_id, "closing subscription");
                }
            }
        }
    }

    /// Queue the event once for every subscription it matches.
    ///
    /// Returns the number of matching subscriptions.
    pub fn deliver(&self, cand: &Candidate<'_>) -> usize {
        if self.is_closed() {
            return 0;
        }
        let matched: Vec<String> = self
            .subs
            .read()
            .iter()
            .filter(|(_, filters)| cand.matches_any(filters))
            .map(|(sub_id, _)| sub_id.clone())
            .collect();
        for sub_id in &matched {
            self.send(RelayMessage::Event {
                sub_id: sub_id.clone(),
                event: cand.event().clone(),
            });
        }
        matched.len()
    }

    /// Terminal transition: drop every subscription and stop processing.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.subs.write().clear();
            // stores a permit if the transport is not waiting yet
            self.shutdown.notify_one();
        }
    }

    fn send(&self, msg: RelayMessage) {
        match self.outbound.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(remote = %self.remote, "outbound queue full, closing session");
                self.close();
            }
            // the writer task is gone once the socket closed; nothing to report to
            Err(TrySendError::Closed(_)) => {
                debug!(remote = %self.remote, "outbound queue closed");
            }
        }
    }
}
