//! Messaging client facade.
//!
//! The public API consumed by the UI process. A [`Client`] owns one
//! connection actor; sends are routed by connection state (transmit,
//! queue, or race the fallback transport), and subscribers receive
//! connection-state transitions and unsolicited push events.
//!
//! # Routing
//!
//! | Connection state | `send` behavior |
//! |------------------|-----------------|
//! | OPEN | transmit immediately, await the correlated response |
//! | CONNECTING / CLOSING | queue until the connection opens |
//! | DISCONNECTED / ERRORED | trigger connect and queue; with [`SendOptions::fallback_tolerant`] and a configured fallback, also race the fallback transport (first completion wins) |
//!
//! # Example
//!
//! ```ignore
//! use assistant_messaging::{Client, ClientConfig};
//!
//! # async fn example() -> assistant_messaging::Result<()> {
//! let config = ClientConfig::new("ws://127.0.0.1:8000/ws")?
//!     .with_fallback_url("http://127.0.0.1:8000/chat/message")?;
//! let client = Client::new(config);
//!
//! client.subscribe(|event| println!("{event:?}"));
//! client.connect();
//!
//! let reply = client.send(serde_json::json!({ "message": "hello" })).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::PushEvent;
use crate::transport::connection::{Command, ConnectionActor, ConnectionState, Shared};
use crate::transport::fallback::{FallbackTransport, HttpFallback};
use crate::transport::pending::Responder;

// ============================================================================
// Types
// ============================================================================

/// Event sink callback type.
///
/// Called for every connection-state transition and push event, in
/// registration order.
pub type EventSink = Box<dyn Fn(&ClientEvent) + Send + Sync>;

// ============================================================================
// ClientEvent
// ============================================================================

/// Notification delivered to subscribers.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The connection entered a new state.
    StateChanged(ConnectionState),
    /// The service sent an unsolicited notification.
    Push(PushEvent),
}

// ============================================================================
// SendOptions
// ============================================================================

/// Per-request send options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Response timeout override; the config default applies when unset.
    pub timeout: Option<Duration>,

    /// The caller tolerates single-shot delivery: while disconnected the
    /// request may race the fallback transport instead of waiting out a
    /// reconnect.
    pub fallback_tolerant: bool,
}

impl SendOptions {
    /// Creates default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response timeout for this request.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Marks the request as tolerating single-shot fallback delivery.
    #[inline]
    #[must_use]
    pub fn fallback_tolerant(mut self) -> Self {
        self.fallback_tolerant = true;
        self
    }
}

// ============================================================================
// ReplyHandle
// ============================================================================

/// A still-pending send.
///
/// Await the result with [`wait`](Self::wait), or abandon it with
/// [`cancel`](Self::cancel); cancellation removes the request from the
/// client's bookkeeping but does not necessarily stop a transmission
/// already on the wire.
pub struct ReplyHandle {
    id: CorrelationId,
    rx: oneshot::Receiver<Result<Value>>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl ReplyHandle {
    /// Returns the request's correlation id.
    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.id
    }

    /// Waits for the request to complete.
    ///
    /// # Errors
    ///
    /// Any failure from the crate taxonomy; [`Error::Cancelled`] if the
    /// request was cancelled.
    pub async fn wait(self) -> Result<Value> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Cancels the request, preventing its completion from ever firing.
    pub fn cancel(self) {
        let _ = self.command_tx.send(Command::Cancel(self.id));
    }
}

// ============================================================================
// Client
// ============================================================================

/// Resilient duplex messaging client.
///
/// One owned instance per caller context; clones share the same
/// connection. The client starts DISCONNECTED: call
/// [`connect`](Self::connect), or just [`send`](Self::send), which
/// triggers connection on demand.
///
/// # Thread Safety
///
/// `Client` is `Send + Sync` and cheap to clone. All operations are
/// non-blocking; mutation happens on the internal actor task.
pub struct Client {
    command_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Mutex<Shared>>,
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Client {
    /// Creates a client for the given configuration.
    ///
    /// If a fallback URL is configured, an HTTP fallback transport is
    /// built for it. Must be called within a tokio runtime; the
    /// connection actor is spawned immediately (in DISCONNECTED state).
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let fallback: Option<Arc<dyn FallbackTransport>> = config
            .fallback_url
            .clone()
            .map(|url| Arc::new(HttpFallback::new(url)) as Arc<dyn FallbackTransport>);
        Self::with_fallback_transport(config, fallback)
    }

    /// Creates a client with a specific fallback transport, overriding
    /// whatever the configuration would build.
    #[must_use]
    pub fn with_fallback_transport(
        config: ClientConfig,
        fallback: Option<Arc<dyn FallbackTransport>>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::new()));

        ConnectionActor::spawn(config, fallback, Arc::clone(&shared), command_rx);

        Self { command_tx, shared }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Sends a request and waits for its response with default options.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if no response arrives within the deadline
    /// - [`Error::Expired`] if the request aged out of the queue
    /// - [`Error::ConnectionLost`] if the connection dropped in flight
    /// - [`Error::Service`] if the peer answered with an error
    pub async fn send(&self, payload: Value) -> Result<Value> {
        self.submit(payload, SendOptions::default()).wait().await
    }

    /// Sends a request with explicit options and waits for its response.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send); additionally [`Error::Transport`] when a
    /// fallback-tolerant request lost its fallback attempt.
    pub async fn send_with(&self, payload: Value, options: SendOptions) -> Result<Value> {
        self.submit(payload, options).wait().await
    }

    /// Submits a request without waiting, returning a cancellable
    /// handle.
    #[must_use]
    pub fn submit(&self, payload: Value, options: SendOptions) -> ReplyHandle {
        let id = CorrelationId::generate();
        let (responder, rx) = Responder::new();

        let command = Command::Send {
            id,
            payload,
            options,
            responder: responder.clone(),
        };
        if self.command_tx.send(command).is_err() {
            responder.resolve(Err(Error::connection_lost("client task terminated")));
        }

        ReplyHandle {
            id,
            rx,
            command_tx: self.command_tx.clone(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts connecting, or resets the reconnect counter of a machine
    /// that gave up.
    ///
    /// Idempotent: a connect already in flight is not restarted, and an
    /// open connection is left alone.
    pub fn connect(&self) {
        let _ = self.command_tx.send(Command::Connect);
    }

    /// Closes the connection voluntarily, suppressing automatic
    /// reconnection. A later [`connect`](Self::connect) resumes service.
    pub fn close(&self) {
        let _ = self.command_tx.send(Command::Close);
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Registers an event sink for connection-state transitions and push
    /// events.
    ///
    /// Every registered sink sees every event, in registration order.
    pub fn subscribe(&self, sink: impl Fn(&ClientEvent) + Send + Sync + 'static) {
        let _ = self.command_tx.send(Command::Subscribe(Box::new(sink)));
    }

    /// Subscribes a channel instead of a callback.
    ///
    /// Convenience wrapper over [`subscribe`](Self::subscribe) for
    /// callers that prefer to consume events from a stream.
    #[must_use]
    pub fn event_stream(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Returns the number of currently queued messages, for diagnostics.
    #[inline]
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.shared.lock().queue_depth
    }
}

// ============================================================================
// Tests
// ============================================================================
