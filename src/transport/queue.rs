//! Outbound queue for messages submitted while not connected.
//!
//! FIFO by enqueue time. Messages either drain into real sends once the
//! connection opens, or age past the staleness horizon and are reported
//! expired to their callers. Nothing is dropped silently.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::identifiers::CorrelationId;
use crate::transport::pending::Responder;

// ============================================================================
// QueuedMessage
// ============================================================================

/// One message waiting for the connection to open.
///
/// The correlation id is assigned at submit time so the message can be
/// cancelled, raced against the fallback transport, and eventually
/// transmitted under one identity.
pub struct QueuedMessage {
    /// Correlation id the message will be transmitted under.
    pub id: CorrelationId,
    /// Opaque request body.
    pub payload: Value,
    /// When the message entered the queue.
    pub enqueued_at: Instant,
    /// Per-request response timeout, applied once transmitted.
    pub timeout: Duration,
    /// Completion slot shared with the caller.
    pub responder: Responder,
}

// ============================================================================
// OutboundQueue
// ============================================================================

/// FIFO queue of undelivered messages.
#[derive(Default)]
pub struct OutboundQueue {
    items: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the queue is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends a message.
    pub fn enqueue(&mut self, message: QueuedMessage) {
        self.items.push_back(message);
    }

    /// Removes and returns the whole batch in enqueue order.
    ///
    /// The removal is atomic: messages enqueued while the batch is being
    /// transmitted land behind it, never interleaved into it.
    #[must_use]
    pub fn drain(&mut self) -> VecDeque<QueuedMessage> {
        std::mem::take(&mut self.items)
    }

    /// Removes and fails every message older than `horizon`, completing
    /// each with [`Error::Expired`].
    ///
    /// Runs before every drain and periodically while disconnected, so a
    /// caller waiting on a stale message hears about it promptly.
    pub fn evict_stale(&mut self, now: Instant, horizon: Duration) -> usize {
        let mut evicted = 0;

        // Enqueue order implies age order: stale entries form a prefix.
        while let Some(front) = self.items.front() {
            let age = now.saturating_duration_since(front.enqueued_at);
            if age <= horizon {
                break;
            }

            if let Some(message) = self.items.pop_front() {
                debug!(id = %message.id, age_ms = age.as_millis() as u64, "queued message expired");
                message
                    .responder
                    .resolve(Err(Error::expired(message.id, age.as_millis() as u64)));
                evicted += 1;
            }
        }

        evicted
    }

    /// Removes the message with the given id without completing its
    /// waiter. Returns `false` if no such message is queued.
    pub fn cancel(&mut self, id: CorrelationId) -> bool {
        match self.items.iter().position(|m| m.id == id) {
            Some(index) => {
                if let Some(message) = self.items.remove(index) {
                    message.responder.disarm();
                }
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::sync::oneshot;

    use crate::error::Result;

    fn message_at(at: Instant, body: &str) -> (QueuedMessage, oneshot::Receiver<Result<Value>>) {
        let (responder, rx) = Responder::new();
        (
            QueuedMessage {
                id: CorrelationId::generate(),
                payload: json!({ "message": body }),
                enqueued_at: at,
                timeout: Duration::from_secs(30),
                responder,
            },
            rx,
        )
    }

    #[test]
    fn test_drain_preserves_fifo_order() {
        let mut queue = OutboundQueue::new();
        let now = Instant::now();
        let (a, _rx_a) = message_at(now, "a");
        let (b, _rx_b) = message_at(now, "b");
        let (c, _rx_c) = message_at(now, "c");

        queue.enqueue(a);
        queue.enqueue(b);
        queue.enqueue(c);

        let batch = queue.drain();
        assert!(queue.is_empty());

        let bodies: Vec<_> = batch
            .iter()
            .map(|m| m.payload["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(bodies, ["a", "b", "c"]);
    }

    #[test]
    fn test_drain_is_atomic() {
        let mut queue = OutboundQueue::new();
        let now = Instant::now();
        let (a, _rx_a) = message_at(now, "a");
        queue.enqueue(a);

        let batch = queue.drain();
        assert_eq!(batch.len(), 1);

        // A message enqueued after the drain lands in the next batch
        let (b, _rx_b) = message_at(now, "b");
        queue.enqueue(b);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_evict_stale_fires_expired() {
        let mut queue = OutboundQueue::new();
        let now = Instant::now();
        let horizon = Duration::from_secs(300);

        let (old, mut rx_old) = message_at(now, "old");
        queue.enqueue(old);
        let (fresh, mut rx_fresh) = message_at(now + Duration::from_secs(299), "fresh");
        queue.enqueue(fresh);

        let evicted = queue.evict_stale(now + Duration::from_secs(301), horizon);
        assert_eq!(evicted, 1);
        assert_eq!(queue.len(), 1);

        let outcome = rx_old.try_recv().expect("resolved");
        assert!(matches!(outcome, Err(Error::Expired { .. })));
        assert!(rx_fresh.try_recv().is_err()); // still queued, not resolved
    }

    #[test]
    fn test_evict_at_horizon_boundary_keeps_message() {
        let mut queue = OutboundQueue::new();
        let now = Instant::now();
        let horizon = Duration::from_secs(300);

        let (message, _rx) = message_at(now, "edge");
        queue.enqueue(message);

        // Exactly at the horizon the message is still fresh
        assert_eq!(queue.evict_stale(now + horizon, horizon), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_cancel_removes_without_firing() {
        let mut queue = OutboundQueue::new();
        let now = Instant::now();
        let (a, _rx_a) = message_at(now, "a");
        let (b, mut rx_b) = message_at(now, "b");
        let cancel_id = b.id;

        queue.enqueue(a);
        queue.enqueue(b);

        assert!(queue.cancel(cancel_id));
        assert!(!queue.cancel(cancel_id));
        assert_eq!(queue.len(), 1);
        assert!(matches!(
            rx_b.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
