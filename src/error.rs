//! Error types for the messaging client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use assistant_messaging::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let reply = client.send(serde_json::json!({ "message": "hi" })).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Request | [`Error::Timeout`], [`Error::Expired`], [`Error::Cancelled`], [`Error::Service`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionLost`], [`Error::ConnectTimeout`] |
//! | Fallback | [`Error::Transport`] |
//! | Internal | [`Error::DuplicateCorrelationId`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CorrelationId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Request Errors
    // ========================================================================
    /// No response arrived within the per-request deadline.
    ///
    /// The pending entry has been removed; a response arriving later is
    /// discarded as unknown.
    #[error("Request {correlation_id} timed out after {timeout_ms}ms")]
    Timeout {
        /// The correlation id that timed out.
        correlation_id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A queued message aged past the staleness horizon while disconnected.
    ///
    /// The message was never transmitted.
    #[error("Queued message {correlation_id} expired after {age_ms}ms in queue")]
    Expired {
        /// The correlation id of the expired message.
        correlation_id: CorrelationId,
        /// Milliseconds the message sat in the queue.
        age_ms: u64,
    },

    /// The request was cancelled by the caller.
    ///
    /// Only produced through [`ReplyHandle::cancel`](crate::ReplyHandle::cancel);
    /// the client never cancels on its own.
    #[error("Request cancelled")]
    Cancelled,

    /// The peer answered this request with a service-level error.
    #[error("Service error: {message}")]
    Service {
        /// Error message reported by the peer.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Dial or handshake failure.
    ///
    /// Recovered internally by the backoff/retry loop; callers only see
    /// this from a terminally errored machine.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Handshake did not complete within the connect timeout.
    #[error("Connect timeout after {timeout_ms}ms")]
    ConnectTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The connection dropped with the request in flight.
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// Why the connection was lost.
        reason: String,
    },

    // ========================================================================
    // Fallback Errors
    // ========================================================================
    /// The fallback transport failed to deliver.
    #[error("Fallback transport error: {message}")]
    Transport {
        /// Description of the fallback failure.
        message: String,
    },

    // ========================================================================
    // Internal Errors
    // ========================================================================
    /// A correlation id was registered twice.
    ///
    /// Unreachable under correct id generation; indicates a programming
    /// error, not a recoverable condition.
    #[error("Duplicate correlation id: {correlation_id}")]
    DuplicateCorrelationId {
        /// The colliding correlation id.
        correlation_id: CorrelationId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a request timeout error.
    #[inline]
    pub fn timeout(correlation_id: CorrelationId, timeout_ms: u64) -> Self {
        Self::Timeout {
            correlation_id,
            timeout_ms,
        }
    }

    /// Creates a queue staleness error.
    #[inline]
    pub fn expired(correlation_id: CorrelationId, age_ms: u64) -> Self {
        Self::Expired {
            correlation_id,
            age_ms,
        }
    }

    /// Creates a service error.
    #[inline]
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connect timeout error.
    #[inline]
    pub fn connect_timeout(timeout_ms: u64) -> Self {
        Self::ConnectTimeout { timeout_ms }
    }

    /// Creates a connection lost error.
    #[inline]
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Creates a fallback transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a duplicate correlation id error.
    #[inline]
    pub fn duplicate_correlation_id(correlation_id: CorrelationId) -> Self {
        Self::DuplicateCorrelationId { correlation_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ConnectTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectTimeout { .. }
                | Self::ConnectionLost { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Expired { .. }
                | Self::ConnectTimeout { .. }
                | Self::ConnectionLost { .. }
                | Self::Transport { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
