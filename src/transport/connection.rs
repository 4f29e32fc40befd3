//! Connection state machine and event loop.
//!
//! One actor task per client owns the duplex socket, the pending-request
//! table, the outbound queue, and the subscriber list. The facade talks
//! to it over a command channel; all mutation happens inside the actor,
//! one event at a time, so no entity is ever half-updated.
//!
//! # Lifecycle
//!
//! ```text
//!            connect()                 handshake ok
//! DISCONNECTED ──────► CONNECTING ─────────────────► OPEN
//!      ▲                   │  handshake failed        │
//!      │                   ▼                          │ peer close /
//!      │ retry cap     ERRORED ◄──────────────────────┘ network drop
//!      │ not reached:      │
//!      │ backoff retry ────┘          close()
//!      └──────────────── CLOSING ◄─── (OPEN / CONNECTING)
//! ```
//!
//! A voluntary `close()` lands in DISCONNECTED and schedules nothing; an
//! involuntary loss schedules a backoff retry until the attempt cap is
//! reached, after which the machine stays ERRORED until an explicit
//! `connect()`.
//!
//! # Event Loop
//!
//! The actor multiplexes four sources:
//!
//! - facade commands (send, cancel, connect, close, subscribe)
//! - handshake results from spawned connect attempts
//! - inbound frames from the open socket
//! - a single shared tick driving request expiry, queue eviction,
//!   heartbeat probes, and retry due-times

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::backoff::BackoffPolicy;
use crate::client::{ClientEvent, EventSink, SendOptions};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{Frame, PushEvent};
use crate::transport::fallback::FallbackTransport;
use crate::transport::pending::{PendingTable, Responder};
use crate::transport::queue::{OutboundQueue, QueuedMessage};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the duplex connection.
///
/// Exactly one instance per client, mutated only by the connection
/// actor; the facade reads a snapshot to route calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Duplex channel established.
    Open,
    /// Voluntary shutdown in progress.
    Closing,
    /// Connection failed; retrying with backoff, or terminal once the
    /// attempt cap is reached.
    Errored,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Shared
// ============================================================================

/// Snapshot readable from the facade without entering the actor.
pub(crate) struct Shared {
    /// Current connection state.
    pub state: ConnectionState,
    /// Number of currently queued messages.
    pub queue_depth: usize,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            queue_depth: 0,
        }
    }
}

// ============================================================================
// Command
// ============================================================================

/// Commands from the facade to the actor.
pub(crate) enum Command {
    /// Route a request per the current connection state.
    Send {
        id: CorrelationId,
        payload: Value,
        options: SendOptions,
        responder: Responder,
    },
    /// Remove a still-pending request without completing it.
    Cancel(CorrelationId),
    /// Explicit connect; resets the reconnect counter.
    Connect,
    /// Voluntary shutdown; suppresses automatic reconnection.
    Close,
    /// Register an event sink.
    Subscribe(EventSink),
}

// ============================================================================
// Internal events
// ============================================================================

/// Results delivered back into the actor from spawned tasks.
enum Internal {
    /// A connect attempt finished.
    Handshake {
        epoch: u64,
        result: Result<Box<WsStream>>,
    },
}

// ============================================================================
// ConnectionActor
// ============================================================================

/// The event-loop task behind a [`Client`](crate::Client).
pub(crate) struct ConnectionActor {
    config: ClientConfig,
    backoff: BackoffPolicy,
    fallback: Option<Arc<dyn FallbackTransport>>,
    shared: Arc<Mutex<Shared>>,

    command_rx: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,

    state: ConnectionState,
    pending: PendingTable,
    queue: OutboundQueue,
    sinks: Vec<EventSink>,

    /// Failed/involuntary closes since the last successful open or
    /// explicit connect.
    attempts: u32,
    /// Invalidates handshake results from superseded connect attempts.
    epoch: u64,
    /// Next automatic retry, while ERRORED with the cap not reached.
    retry_at: Option<Instant>,
    /// Set between `close()` and the transport confirming the close.
    shutting_down: bool,

    writer: Option<WsWriter>,
    reader: Option<WsReader>,

    last_ping_at: Option<Instant>,
    unanswered_pings: u32,
}

impl ConnectionActor {
    /// Spawns the actor task.
    pub(crate) fn spawn(
        config: ClientConfig,
        fallback: Option<Arc<dyn FallbackTransport>>,
        shared: Arc<Mutex<Shared>>,
        command_rx: mpsc::UnboundedReceiver<Command>,
    ) {
        let backoff = BackoffPolicy::new(config.backoff_base, config.backoff_cap);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let actor = Self {
            config,
            backoff,
            fallback,
            shared,
            command_rx,
            internal_tx,
            internal_rx,
            state: ConnectionState::Disconnected,
            pending: PendingTable::new(),
            queue: OutboundQueue::new(),
            sinks: Vec::new(),
            attempts: 0,
            epoch: 0,
            retry_at: None,
            shutting_down: false,
            writer: None,
            reader: None,
            last_ping_at: None,
            unanswered_pings: 0,
        };

        tokio::spawn(actor.run());
    }

    /// Runs the event loop until every facade handle is dropped.
    async fn run(mut self) {
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }

                Some(internal) = self.internal_rx.recv() => {
                    self.handle_internal(internal).await;
                }

                message = Self::next_message(&mut self.reader) => {
                    self.handle_socket(message).await;
                }

                _ = tick.tick() => {
                    self.handle_tick().await;
                }
            }
        }

        // Facade dropped: release every waiter and close the socket.
        let dropped = self.pending.drain_all("client dropped");
        if dropped > 0 {
            debug!(count = dropped, "failed pending requests on shutdown");
        }
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.close().await;
        }
        debug!("connection actor terminated");
    }

    /// Reads the next socket message; pends forever while disconnected,
    /// leaving the other select arms in charge.
    async fn next_message(reader: &mut Option<WsReader>) -> Option<std::result::Result<Message, WsError>> {
        match reader {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }

    // ========================================================================
    // Command handling
    // ========================================================================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send {
                id,
                payload,
                options,
                responder,
            } => {
                self.handle_send(id, payload, options, responder).await;
            }

            Command::Cancel(id) => {
                let was_pending = self.pending.cancel(id);
                let was_queued = self.queue.cancel(id);
                if was_pending || was_queued {
                    debug!(%id, "request cancelled");
                }
                self.sync_shared();
            }

            Command::Connect => {
                // Deliberate caller action: the counter starts over even
                // if the machine was terminally errored.
                self.attempts = 0;
                if matches!(
                    self.state,
                    ConnectionState::Disconnected | ConnectionState::Errored
                ) {
                    self.start_connect();
                }
            }

            Command::Close => self.handle_close().await,

            Command::Subscribe(sink) => self.sinks.push(sink),
        }
    }

    /// Routes a send per the current connection state.
    async fn handle_send(
        &mut self,
        id: CorrelationId,
        payload: Value,
        options: SendOptions,
        responder: Responder,
    ) {
        let timeout = options.timeout.unwrap_or(self.config.request_timeout);

        match self.state {
            ConnectionState::Open => {
                self.transmit(id, payload, timeout, responder).await;
            }

            ConnectionState::Connecting | ConnectionState::Closing => {
                self.enqueue(id, payload, timeout, responder);
            }

            ConnectionState::Disconnected | ConnectionState::Errored => {
                // A send is caller activity; treat it like an explicit
                // connect so a terminally errored machine wakes up.
                self.attempts = 0;
                self.start_connect();

                let race_fallback = options.fallback_tolerant && self.fallback.is_some();
                self.enqueue(id, payload.clone(), timeout, responder.clone());
                if race_fallback {
                    self.spawn_fallback(id, payload, responder);
                }
            }
        }
    }

    fn enqueue(&mut self, id: CorrelationId, payload: Value, timeout: Duration, responder: Responder) {
        self.queue.enqueue(QueuedMessage {
            id,
            payload,
            enqueued_at: Instant::now(),
            timeout,
            responder,
        });
        trace!(%id, depth = self.queue.len(), "message queued");
        self.sync_shared();
    }

    /// Registers a pending entry and writes the request frame.
    async fn transmit(
        &mut self,
        id: CorrelationId,
        payload: Value,
        timeout: Duration,
        responder: Responder,
    ) {
        // The fallback may already have won the race for this message.
        if !responder.is_armed() {
            trace!(%id, "skipping transmit of resolved message");
            return;
        }

        let text = match serde_json::to_string(&Frame::request(id, payload)) {
            Ok(text) => text,
            Err(e) => {
                responder.resolve(Err(Error::Json(e)));
                return;
            }
        };

        if let Err(e) = self
            .pending
            .register(id, responder.clone(), Instant::now(), timeout)
        {
            error!(%id, "correlation id collision");
            responder.resolve(Err(e));
            return;
        }

        if let Err(e) = self.write_text(text).await {
            // The socket is dead; fail this request directly and let the
            // loss path handle the rest.
            self.pending.cancel(id);
            responder.resolve(Err(Error::connection_lost(e.to_string())));
            self.handle_connection_loss("write failed").await;
            return;
        }

        trace!(%id, "request sent");
    }

    /// Races the fallback transport against eventual duplex delivery.
    fn spawn_fallback(&self, id: CorrelationId, payload: Value, responder: Responder) {
        let Some(transport) = self.fallback.as_ref().map(Arc::clone) else {
            return;
        };

        debug!(%id, "dispatching on fallback transport");
        tokio::spawn(async move {
            let outcome = match transport.send_once(Frame::request(id, payload)).await {
                Ok(Frame::Response {
                    payload,
                    error: None,
                    ..
                }) => Ok(payload),
                Ok(Frame::Response {
                    error: Some(message),
                    ..
                }) => Err(Error::service(message)),
                Ok(other) => Err(Error::transport(format!(
                    "unexpected fallback frame: {other:?}"
                ))),
                Err(e) => Err(e),
            };

            // First resolution wins; if the duplex path got there first
            // this is a no-op.
            if responder.resolve(outcome) {
                debug!(%id, "request resolved via fallback");
            }
        });
    }

    async fn handle_close(&mut self) {
        match self.state {
            ConnectionState::Open => {
                self.shutting_down = true;
                self.transition(ConnectionState::Closing);
                let close_sent = match self.writer.as_mut() {
                    Some(writer) => writer.send(Message::Close(None)).await,
                    None => Ok(()),
                };
                if let Err(e) = close_sent {
                    warn!(error = %e, "close frame failed");
                    self.handle_connection_loss("close failed").await;
                }
                // Keep reading until the peer confirms; frames that
                // arrive while closing are still processed.
            }

            ConnectionState::Connecting => {
                self.shutting_down = true;
                self.transition(ConnectionState::Closing);
            }

            ConnectionState::Errored => {
                self.retry_at = None;
                self.transition(ConnectionState::Disconnected);
            }

            ConnectionState::Disconnected | ConnectionState::Closing => {}
        }
    }

    // ========================================================================
    // Connecting
    // ========================================================================

    /// Starts a handshake attempt. No-op while already connecting or
    /// open, so concurrent triggers collapse into one attempt.
    fn start_connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return;
        }

        self.retry_at = None;
        self.shutting_down = false;
        self.epoch += 1;

        let epoch = self.epoch;
        let url = self.config.duplex_url.clone();
        let connect_timeout = self.config.connect_timeout;
        let internal_tx = self.internal_tx.clone();

        self.transition(ConnectionState::Connecting);
        debug!(url = %url, attempt = self.attempts, "connecting");

        tokio::spawn(async move {
            let result = match tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
                .await
            {
                Ok(Ok((stream, _response))) => Ok(Box::new(stream)),
                Ok(Err(e)) => Err(Error::connection(e.to_string())),
                Err(_) => Err(Error::connect_timeout(connect_timeout.as_millis() as u64)),
            };

            let _ = internal_tx.send(Internal::Handshake { epoch, result });
        });
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Handshake { epoch, result } => self.handle_handshake(epoch, result).await,
        }
    }

    async fn handle_handshake(&mut self, epoch: u64, result: Result<Box<WsStream>>) {
        if epoch != self.epoch {
            // Superseded attempt; a late socket gets closed, a late
            // failure is irrelevant.
            if let Ok(mut stream) = result {
                debug!("discarding stale handshake");
                tokio::spawn(async move {
                    let _ = stream.close(None).await;
                });
            }
            return;
        }

        match result {
            Ok(stream) => {
                if self.state != ConnectionState::Connecting {
                    // close() won the race against the handshake.
                    let mut stream = stream;
                    tokio::spawn(async move {
                        let _ = stream.close(None).await;
                    });
                    if self.shutting_down {
                        self.shutting_down = false;
                        self.transition(ConnectionState::Disconnected);
                    }
                    return;
                }

                let (writer, reader) = (*stream).split();
                self.writer = Some(writer);
                self.reader = Some(reader);
                self.attempts = 0;
                self.unanswered_pings = 0;
                self.last_ping_at = Some(Instant::now());
                self.transition(ConnectionState::Open);
                self.drain_queue().await;
            }

            Err(e) => {
                if self.state == ConnectionState::Closing {
                    // close() during the handshake; nothing to retry.
                    self.shutting_down = false;
                    self.transition(ConnectionState::Disconnected);
                    return;
                }
                warn!(error = %e, attempt = self.attempts, "handshake failed");
                self.schedule_retry();
            }
        }
    }

    /// Books one failed/involuntary close and either schedules a backoff
    /// retry or goes terminal once the cap is reached.
    fn schedule_retry(&mut self) {
        let attempt = self.attempts;
        self.attempts += 1;

        if self.attempts >= self.config.max_reconnect_attempts {
            warn!(
                attempts = self.attempts,
                "reconnect attempts exhausted; waiting for explicit connect"
            );
            self.retry_at = None;
        } else {
            let delay = self.backoff.next_delay(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "retry scheduled");
            self.retry_at = Some(Instant::now() + delay);
        }

        self.transition(ConnectionState::Errored);
    }

    // ========================================================================
    // Socket handling
    // ========================================================================

    async fn handle_socket(&mut self, message: Option<std::result::Result<Message, WsError>>) {
        match message {
            Some(Ok(Message::Text(text))) => self.handle_frame(&text).await,

            Some(Ok(Message::Close(_))) => {
                debug!("socket closed by peer");
                self.handle_connection_loss("closed by peer").await;
            }

            Some(Err(e)) => {
                warn!(error = %e, "socket error");
                self.handle_connection_loss("socket error").await;
            }

            None => {
                debug!("socket stream ended");
                self.handle_connection_loss("stream ended").await;
            }

            // Binary frames and protocol-level ping/pong are not part of
            // the message protocol.
            Some(Ok(_)) => {}
        }
    }

    /// Parses and routes one inbound frame.
    ///
    /// Malformed payloads are logged and dropped; they never crash the
    /// actor and never resolve a pending request.
    async fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<Frame>(text) {
            Ok(Frame::Response { id, payload, error }) => {
                let outcome = match error {
                    Some(message) => Err(Error::service(message)),
                    None => Ok(payload),
                };
                if !self.pending.resolve(id, outcome) {
                    warn!(%id, "response for unknown request");
                }
            }

            Ok(Frame::Push { event, payload }) => {
                trace!(event = %event, "push event");
                self.emit(ClientEvent::Push(PushEvent { event, payload }));
            }

            Ok(Frame::Ping) => {
                if let Err(e) = self.write_frame(&Frame::Pong).await {
                    warn!(error = %e, "pong failed");
                    self.handle_connection_loss("write failed").await;
                }
            }

            Ok(Frame::Pong) => {
                self.unanswered_pings = 0;
            }

            Ok(Frame::Request { id, .. }) => {
                warn!(%id, "unexpected request frame from peer");
            }

            Err(e) => {
                warn!(error = %e, text, "failed to parse incoming frame");
            }
        }
    }

    /// Tears down the socket after an involuntary loss or a confirmed
    /// voluntary close.
    ///
    /// Reentrant calls (several write failures in one drain) collapse
    /// into the first; only one retry is booked per lost connection.
    async fn handle_connection_loss(&mut self, reason: &str) {
        if !matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Closing
        ) {
            return;
        }

        self.reader = None;
        self.writer = None;
        self.last_ping_at = None;
        self.unanswered_pings = 0;

        let dropped = self.pending.drain_all(reason);
        if dropped > 0 {
            debug!(count = dropped, reason, "failed in-flight requests");
        }

        if self.shutting_down {
            self.shutting_down = false;
            self.transition(ConnectionState::Disconnected);
        } else {
            self.schedule_retry();
        }
        self.sync_shared();
    }

    // ========================================================================
    // Tick
    // ========================================================================

    async fn handle_tick(&mut self) {
        let now = Instant::now();

        let expired = self.pending.expire_older_than(now);
        if expired > 0 {
            debug!(count = expired, "requests timed out");
        }

        let evicted = self.queue.evict_stale(now, self.config.queue_horizon);
        if evicted > 0 {
            debug!(count = evicted, "queued messages expired");
        }

        if self.state == ConnectionState::Open {
            self.heartbeat(now).await;
        }

        if self.state == ConnectionState::Errored
            && self.retry_at.is_some_and(|at| now >= at)
        {
            self.retry_at = None;
            debug!(attempt = self.attempts, "automatic retry");
            self.start_connect();
        }

        self.sync_shared();
    }

    /// Sends a liveness probe once per heartbeat interval; with the
    /// liveness check enabled, too many unanswered probes force the
    /// involuntary-loss path.
    async fn heartbeat(&mut self, now: Instant) {
        let due = self
            .last_ping_at
            .is_none_or(|at| now.duration_since(at) >= self.config.heartbeat_interval);
        if !due {
            return;
        }

        if let Some(max) = self.config.max_missed_pongs
            && self.unanswered_pings >= max
        {
            warn!(
                unanswered = self.unanswered_pings,
                "liveness probes unanswered"
            );
            self.handle_connection_loss("heartbeat timeout").await;
            return;
        }

        self.last_ping_at = Some(now);
        self.unanswered_pings += 1;
        if let Err(e) = self.write_frame(&Frame::Ping).await {
            warn!(error = %e, "heartbeat failed");
            self.handle_connection_loss("write failed").await;
        }
    }

    // ========================================================================
    // Open-state helpers
    // ========================================================================

    /// Transmits the queued batch in enqueue order.
    ///
    /// Stale entries are evicted first; entries whose responder already
    /// resolved (fallback won, or cancelled) are skipped inside
    /// `transmit`.
    async fn drain_queue(&mut self) {
        self.queue
            .evict_stale(Instant::now(), self.config.queue_horizon);

        let batch = self.queue.drain();
        if !batch.is_empty() {
            debug!(count = batch.len(), "draining outbound queue");
        }

        for message in batch {
            self.transmit(
                message.id,
                message.payload,
                message.timeout,
                message.responder,
            )
            .await;
        }
        self.sync_shared();
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.write_text(text).await
    }

    async fn write_text(&mut self, text: String) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer
                .send(Message::Text(text.into()))
                .await
                .map_err(Error::from),
            None => Err(Error::connection_lost("socket not open")),
        }
    }

    // ========================================================================
    // State bookkeeping
    // ========================================================================

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "connection state");
        self.state = next;
        self.sync_shared();
        self.emit(ClientEvent::StateChanged(next));
    }

    fn emit(&self, event: ClientEvent) {
        for sink in &self.sinks {
            sink(&event);
        }
    }

    fn sync_shared(&self) {
        let mut shared = self.shared.lock();
        shared.state = self.state;
        shared.queue_depth = self.queue.len();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::client::Client;
    use crate::testutil::{ServerMode, TestServer, fast_config, recv_state, unused_endpoint};

    #[tokio::test]
    async fn test_connect_reaches_open() {
        let server = TestServer::spawn(ServerMode::Echo).await;
        let client = Client::new(fast_config(&server.url));
        let mut events = client.event_stream();

        client.connect();

        assert_eq!(
            recv_state(&mut events).await,
            ConnectionState::Connecting
        );
        assert_eq!(recv_state(&mut events).await, ConnectionState::Open);
        assert_eq!(client.connection_state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_heartbeat_probes_sent_while_open() {
        let mut server = TestServer::spawn(ServerMode::Echo).await;
        let config = fast_config(&server.url)
            .with_heartbeat_interval(Duration::from_millis(40));
        let client = Client::new(config);
        let mut events = client.event_stream();
        client.connect();
        while recv_state(&mut events).await != ConnectionState::Open {}

        let mut pings = 0;
        while pings < 2 {
            if server.recv_frame().await == Frame::Ping {
                pings += 1;
            }
        }
    }

    #[tokio::test]
    async fn test_missed_pongs_force_reconnect() {
        // Silent server: accepts frames, answers nothing, including pings.
        let server = TestServer::spawn(ServerMode::Silent).await;
        let config = fast_config(&server.url)
            .with_heartbeat_interval(Duration::from_millis(20))
            .with_max_missed_pongs(2);
        let client = Client::new(config);
        let mut events = client.event_stream();
        client.connect();
        while recv_state(&mut events).await != ConnectionState::Open {}

        // Liveness check trips: the machine leaves OPEN without any peer
        // close, then retries.
        assert_eq!(recv_state(&mut events).await, ConnectionState::Errored);
        assert_eq!(
            recv_state(&mut events).await,
            ConnectionState::Connecting
        );
    }

    #[tokio::test]
    async fn test_attempt_cap_goes_terminal() {
        let client = Client::new(
            fast_config(&unused_endpoint().await).with_max_reconnect_attempts(3),
        );
        let mut events = client.event_stream();
        client.connect();

        // Three dial attempts, then ERRORED with no further retry.
        let mut connecting = 0;
        loop {
            match recv_state(&mut events).await {
                ConnectionState::Connecting => connecting += 1,
                ConnectionState::Errored if connecting == 3 => break,
                ConnectionState::Errored => {}
                other => panic!("unexpected state: {other}"),
            }
        }

        // No retry is scheduled past the cap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.connection_state(), ConnectionState::Errored);

        // An explicit connect resets the counter and tries again.
        client.connect();
        assert_eq!(
            recv_state(&mut events).await,
            ConnectionState::Connecting
        );
    }

    #[tokio::test]
    async fn test_push_frames_reach_subscribers() {
        let server = TestServer::spawn(ServerMode::Echo).await;
        let client = Client::new(fast_config(&server.url));
        let mut events = client.event_stream();
        client.connect();
        while recv_state(&mut events).await != ConnectionState::Open {}

        server.send_frame(Frame::Push {
            event: "settings_updated".into(),
            payload: json!({ "theme": "dark" }),
        });

        loop {
            match events.recv().await.expect("event") {
                ClientEvent::Push(push) => {
                    assert_eq!(push.event, "settings_updated");
                    assert_eq!(push.payload["theme"], "dark");
                    break;
                }
                ClientEvent::StateChanged(_) => {}
            }
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let server = TestServer::spawn(ServerMode::Echo).await;
        let client = Client::new(fast_config(&server.url));
        let mut events = client.event_stream();
        client.connect();
        while recv_state(&mut events).await != ConnectionState::Open {}

        server.send_text("this is not json");
        server.send_text(r#"{"type":"chat","data":{}}"#);

        // The connection survives and still answers requests.
        let reply = client
            .send(json!({ "message": "still alive" }))
            .await
            .expect("echo");
        assert_eq!(reply["message"], "still alive");
        assert_eq!(client.connection_state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_close_is_voluntary_and_terminal_for_session() {
        let server = TestServer::spawn(ServerMode::Echo).await;
        let client = Client::new(fast_config(&server.url));
        let mut events = client.event_stream();
        client.connect();
        while recv_state(&mut events).await != ConnectionState::Open {}

        client.close();
        assert_eq!(recv_state(&mut events).await, ConnectionState::Closing);
        assert_eq!(
            recv_state(&mut events).await,
            ConnectionState::Disconnected
        );

        // No automatic reconnect after a voluntary close.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);

        // The session resumes on explicit connect.
        client.connect();
        assert_eq!(
            recv_state(&mut events).await,
            ConnectionState::Connecting
        );
        assert_eq!(recv_state(&mut events).await, ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_peer_drop_schedules_reconnect() {
        let server = TestServer::spawn(ServerMode::Echo).await;
        let client = Client::new(fast_config(&server.url));
        let mut events = client.event_stream();
        client.connect();
        while recv_state(&mut events).await != ConnectionState::Open {}

        server.drop_connection();

        assert_eq!(recv_state(&mut events).await, ConnectionState::Errored);
        assert_eq!(
            recv_state(&mut events).await,
            ConnectionState::Connecting
        );
        assert_eq!(recv_state(&mut events).await, ConnectionState::Open);
    }
}
