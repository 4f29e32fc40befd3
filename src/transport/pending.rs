//! Pending-request table.
//!
//! Maps correlation ids to waiting callers. Entries leave the table in
//! exactly one of four ways: a matching response, a timeout sweep, a
//! connection-loss drain, or caller cancellation. Whichever happens, the
//! caller's waiter completes at most once.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

// ============================================================================
// Responder
// ============================================================================

/// Single-shot completion slot for one request.
///
/// Clones share the slot, so the duplex path and the fallback race can
/// both hold the same responder; the first resolution wins and every
/// later one is a no-op. Disarming (cancellation) drops the sender
/// without firing it.
#[derive(Clone)]
pub struct Responder {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<Value>>>>>,
}

impl Responder {
    /// Creates a responder and the receiver its caller waits on.
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<Result<Value>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Completes the request, if it has not completed already.
    ///
    /// Returns `false` if the responder was already resolved or disarmed.
    pub fn resolve(&self, outcome: Result<Value>) -> bool {
        match self.slot.lock().take() {
            Some(tx) => {
                // The caller may have dropped its receiver; that is its
                // way of abandoning the result.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drops the sender without firing it, so the waiter is released
    /// with a cancellation instead of a result.
    pub fn disarm(&self) -> bool {
        self.slot.lock().take().is_some()
    }

    /// Returns `true` if the request can still be completed.
    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }
}

// ============================================================================
// PendingRequest
// ============================================================================

/// One in-flight request awaiting its response.
struct PendingRequest {
    responder: Responder,
    registered_at: Instant,
    timeout_at: Instant,
}

// ============================================================================
// PendingTable
// ============================================================================

/// Correlation table for in-flight duplex requests.
#[derive(Default)]
pub struct PendingTable {
    entries: FxHashMap<CorrelationId, PendingRequest>,
}

impl PendingTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of in-flight requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no requests are in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers an in-flight request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCorrelationId`] if the id is already
    /// registered. Ids are generated, not user-supplied, so this is a
    /// programming error rather than a runtime condition.
    pub fn register(
        &mut self,
        id: CorrelationId,
        responder: Responder,
        now: Instant,
        timeout: Duration,
    ) -> Result<()> {
        if self.entries.contains_key(&id) {
            return Err(Error::duplicate_correlation_id(id));
        }

        self.entries.insert(
            id,
            PendingRequest {
                responder,
                registered_at: now,
                timeout_at: now + timeout,
            },
        );
        trace!(%id, "request registered");
        Ok(())
    }

    /// Resolves the entry for `id`, removing it and completing its
    /// waiter with `outcome`.
    ///
    /// Returns `false` if the id is unknown. A duplicate or late
    /// response is not an error; the caller logs and moves on.
    pub fn resolve(&mut self, id: CorrelationId, outcome: Result<Value>) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                entry.responder.resolve(outcome);
                true
            }
            None => false,
        }
    }

    /// Removes every entry whose deadline has passed, completing each
    /// with [`Error::Timeout`].
    ///
    /// Runs on every tick of the client's internal clock, so timeouts
    /// fire even when no further traffic arrives.
    pub fn expire_older_than(&mut self, now: Instant) -> usize {
        let expired: Vec<CorrelationId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.timeout_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = self.entries.remove(id) {
                let waited = entry
                    .timeout_at
                    .duration_since(entry.registered_at)
                    .as_millis() as u64;
                debug!(%id, timeout_ms = waited, "request timed out");
                entry.responder.resolve(Err(Error::timeout(*id, waited)));
            }
        }

        expired.len()
    }

    /// Removes every entry, completing each with [`Error::ConnectionLost`]
    /// carrying `reason`. Used when the connection drops with requests in
    /// flight.
    pub fn drain_all(&mut self, reason: &str) -> usize {
        let count = self.entries.len();

        for (_, entry) in self.entries.drain() {
            entry
                .responder
                .resolve(Err(Error::connection_lost(reason)));
        }

        count
    }

    /// Removes the entry for `id` without completing its waiter.
    ///
    /// Returns `false` if the id is unknown.
    pub fn cancel(&mut self, id: CorrelationId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                entry.responder.disarm();
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
