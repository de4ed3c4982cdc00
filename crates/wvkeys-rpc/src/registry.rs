//! Correlation registry: tracks calls awaiting a reply.
//!
//! Each call registers a one-shot slot under a fresh correlation id. The
//! inbound loop fills the slot through [`CorrelationRegistry::resolve`]; the
//! caller waits on it with [`PendingCall::await_result`]. Dropping the
//! [`PendingCall`] removes the entry, so timeouts, send failures and
//! cancelled callers never leave anything behind.
//!
//! When a transport loses its inbound loop it [closes](CorrelationRegistry::close)
//! the registry: every waiter wakes at once and new calls are refused.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;
use wvkeys_types::InboundFrame;

/// Identifier tying a reply to the call that is waiting for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

struct PendingRequest {
    created_at: Instant,
    slot: oneshot::Sender<InboundFrame>,
}

#[derive(Default)]
pub struct CorrelationRegistry {
    pending: Mutex<HashMap<CorrelationId, PendingRequest>>,
    closed: AtomicBool,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id and an empty result slot for it.
    pub fn register(&self) -> PendingCall<'_> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap();
        let id = loop {
            let candidate = CorrelationId::generate();
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        // A closed registry never fills the slot; the waiter wakes empty.
        if !self.closed.load(Ordering::SeqCst) {
            pending.insert(
                id.clone(),
                PendingRequest {
                    created_at: Instant::now(),
                    slot: tx,
                },
            );
        }
        PendingCall {
            registry: self,
            id,
            rx,
        }
    }

    /// Deliver `frame` to the caller waiting on `id`.
    ///
    /// Returns `false` when nothing is pending under `id` (late, duplicate or
    /// unknown reply); the frame is dropped.
    pub fn resolve(&self, id: &str, frame: InboundFrame) -> bool {
        self.try_resolve(id, frame).is_ok()
    }

    /// Like [`resolve`](Self::resolve), but hands the frame back when no call
    /// is pending under `id`.
    pub(crate) fn try_resolve(&self, id: &str, frame: InboundFrame) -> Result<(), InboundFrame> {
        let entry = self.pending.lock().unwrap().remove(id);
        match entry {
            Some(entry) => {
                if entry.slot.send(frame).is_err() {
                    debug!(correlation_id = id, "Caller went away before its reply arrived");
                }
                Ok(())
            }
            None => Err(frame),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.lock().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }

    /// Drop entries older than `max_age`. Their callers wake up as timed out.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let mut pending = self.pending.lock().unwrap();
        let before = pending.len();
        pending.retain(|_, entry| entry.created_at.elapsed() < max_age);
        before - pending.len()
    }

    /// Mark the reply path dead and wake every waiter empty-handed.
    /// Returns how many calls were in flight.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.pending.lock().unwrap().drain().collect();
        drained.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn remove(&self, id: &CorrelationId) {
        self.pending.lock().unwrap().remove(id);
    }
}

/// A registered call. Removes its registry entry on drop.
pub struct PendingCall<'a> {
    registry: &'a CorrelationRegistry,
    id: CorrelationId,
    rx: oneshot::Receiver<InboundFrame>,
}

impl PendingCall<'_> {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Wait for the reply. `None` means the deadline passed or the entry was
    /// purged; either way the entry is gone afterwards.
    pub async fn await_result(&mut self, timeout: Duration) -> Option<InboundFrame> {
        let result = match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(frame)) => Some(frame),
            Ok(Err(_)) | Err(_) => None,
        };
        self.registry.remove(&self.id);
        result
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
