//! Shared helpers for async tests: an in-process WebSocket peer, a
//! canned fallback transport, and tuned-down client configurations.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::client::ClientEvent;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::transport::connection::ConnectionState;
use crate::transport::fallback::FallbackTransport;

// ============================================================================
// TestServer
// ============================================================================

/// How the server treats inbound request frames.
pub(crate) enum ServerMode {
    /// Answer requests by echoing their payload; answer pings with pongs.
    Echo,
    /// Accept everything, answer nothing.
    Silent,
}

/// Actions injected into the currently served connection.
enum ServerAction {
    Send(String),
    Drop,
}

/// An in-process WebSocket peer.
///
/// Accepts connections sequentially (so reconnect tests work), records
/// every parsed inbound frame in arrival order, and lets tests inject
/// outbound frames or kill the live connection.
pub(crate) struct TestServer {
    /// Duplex URL clients should connect to.
    pub url: String,
    seen_rx: mpsc::UnboundedReceiver<Frame>,
    action_tx: mpsc::UnboundedSender<ServerAction>,
}

impl TestServer {
    pub(crate) async fn spawn(mode: ServerMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        tokio::spawn(accept_loop(listener, mode, seen_tx, action_rx));

        Self {
            url: format!("ws://{addr}/ws"),
            seen_rx,
            action_tx,
        }
    }

    /// Waits for the next frame the server received.
    pub(crate) async fn recv_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), self.seen_rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("server terminated")
    }

    /// Sends a frame to the connected client.
    pub(crate) fn send_frame(&self, frame: Frame) {
        self.send_text(&serde_json::to_string(&frame).expect("serialize"));
    }

    /// Sends raw text to the connected client.
    pub(crate) fn send_text(&self, text: &str) {
        let _ = self.action_tx.send(ServerAction::Send(text.to_string()));
    }

    /// Closes the live connection, simulating a network drop.
    pub(crate) fn drop_connection(&self) {
        let _ = self.action_tx.send(ServerAction::Drop);
    }
}

async fn accept_loop(
    listener: TcpListener,
    mode: ServerMode,
    seen_tx: mpsc::UnboundedSender<Frame>,
    mut action_rx: mpsc::UnboundedReceiver<ServerAction>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
            continue;
        };
        serve_connection(ws, &mode, &seen_tx, &mut action_rx).await;
    }
}

async fn serve_connection(
    mut ws: WebSocketStream<TcpStream>,
    mode: &ServerMode,
    seen_tx: &mpsc::UnboundedSender<Frame>,
    action_rx: &mut mpsc::UnboundedReceiver<ServerAction>,
) {
    loop {
        tokio::select! {
            message = ws.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(frame) = serde_json::from_str::<Frame>(&text) else {
                            continue;
                        };

                        let reply = match (mode, &frame) {
                            (ServerMode::Echo, Frame::Request { id, payload }) => {
                                Some(Frame::response(*id, payload.clone()))
                            }
                            (ServerMode::Echo, Frame::Ping) => Some(Frame::Pong),
                            _ => None,
                        };

                        let _ = seen_tx.send(frame);

                        if let Some(reply) = reply {
                            let text = serde_json::to_string(&reply).expect("serialize");
                            if ws.send(Message::Text(text.into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }

            action = action_rx.recv() => {
                match action {
                    Some(ServerAction::Send(text)) => {
                        if ws.send(Message::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    Some(ServerAction::Drop) => {
                        let _ = ws.close(None).await;
                        return;
                    }
                    None => return,
                }
            }
        }
    }
}

// ============================================================================
// InstantFallback
// ============================================================================

/// Fallback transport that answers immediately, tagging the echo so
/// tests can tell which path delivered.
pub(crate) struct InstantFallback;

#[async_trait]
impl FallbackTransport for InstantFallback {
    async fn send_once(&self, request: Frame) -> Result<Frame> {
        match request {
            Frame::Request { id, payload } => Ok(Frame::response(
                id,
                json!({ "via": "fallback", "echo": payload }),
            )),
            other => Err(Error::transport(format!("unexpected frame: {other:?}"))),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Installs the test log subscriber once; run tests with
/// `RUST_LOG=assistant_messaging=trace` to watch the state machine.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Client configuration tuned for fast tests: 10ms ticks, tens of
/// milliseconds of backoff, and heartbeats effectively off unless a test
/// overrides them.
pub(crate) fn fast_config(url: &str) -> ClientConfig {
    init_tracing();
    ClientConfig::new(url)
        .expect("valid url")
        .with_tick_interval(Duration::from_millis(10))
        .with_backoff_base(Duration::from_millis(20))
        .with_backoff_cap(Duration::from_millis(60))
        .with_connect_timeout(Duration::from_secs(2))
        .with_heartbeat_interval(Duration::from_secs(60))
}

/// Returns a ws:// endpoint with nothing listening on it.
pub(crate) async fn unused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{addr}/ws")
}

/// Waits for the next state transition, skipping push events.
pub(crate) async fn recv_state(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
) -> ConnectionState {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for state change")
            .expect("event channel closed");
        if let ClientEvent::StateChanged(state) = event {
            return state;
        }
    }
}
