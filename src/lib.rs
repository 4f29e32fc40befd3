//! Assistant Messaging - Resilient duplex messaging client.
//!
//! This library connects a UI process to its backend service over a
//! persistent duplex channel, surviving network interruption,
//! correlating asynchronous requests with their responses, queuing work
//! while disconnected, and degrading to a synchronous fallback transport
//! when the duplex channel cannot be established.
//!
//! # Architecture
//!
//! The client follows an actor model:
//!
//! - **Facade ([`Client`])**: cheap-to-clone handle; routes sends by
//!   connection state and exposes read-only snapshots
//! - **Connection actor**: owns the WebSocket, the pending-request
//!   table, and the outbound queue; every mutation happens on this one
//!   task
//! - **Fallback transport**: stateless single-shot channel raced against
//!   duplex delivery for callers that opt in
//!
//! Key design principles:
//!
//! - One owned client instance per caller context, passed explicitly
//! - Explicit state machine ([`ConnectionState`]) driven by transport
//!   events, not a web of boolean flags
//! - Every submitted request completes exactly once: response, timeout,
//!   expiry, connection loss, or caller cancellation
//! - Reconnection with deterministic exponential backoff and an attempt
//!   cap; a single shared tick drives all time-based behavior
//!
//! # Quick Start
//!
//! ```no_run
//! use assistant_messaging::{Client, ClientConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::new("ws://127.0.0.1:8000/ws")?
//!         .with_fallback_url("http://127.0.0.1:8000/chat/message")?;
//!     let client = Client::new(config);
//!
//!     // Watch connection state and push notifications
//!     client.subscribe(|event| println!("event: {event:?}"));
//!
//!     // Sends connect on demand and queue while the link is down
//!     let reply = client.send(serde_json::json!({ "message": "hello" })).await?;
//!     println!("reply: {reply}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backoff`] | Reconnect backoff policy |
//! | [`client`] | Public facade: [`Client`], send options, reply handles |
//! | [`config`] | Configuration surface |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Correlation-id newtype |
//! | [`protocol`] | Wire frame types (internal) |
//! | [`transport`] | Connection state machine and transports (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Reconnect backoff policy.
pub mod backoff;

/// Messaging client facade.
///
/// Use [`Client::new`] with a [`ClientConfig`] to create an instance.
pub mod client;

/// Client configuration.
///
/// Values only; behavior lives in the connection state machine.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for message correlation.
pub mod identifiers;

/// Wire protocol message types.
///
/// Internal module defining the frame format shared by both transports.
pub mod protocol;

/// Transport layer.
///
/// Internal module handling the duplex connection, request bookkeeping,
/// and the fallback channel.
pub mod transport;

#[cfg(test)]
mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientEvent, EventSink, ReplyHandle, SendOptions};

// Configuration types
pub use config::ClientConfig;

// Connection types
pub use transport::ConnectionState;
pub use transport::{FallbackTransport, HttpFallback};

// Policy types
pub use backoff::BackoffPolicy;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::CorrelationId;

// Protocol types
pub use protocol::{Frame, PushEvent};
