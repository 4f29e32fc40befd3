//! Frame types for the duplex and fallback channels.
//!
//! Every message on the wire is a JSON object with a `type` discriminator.
//! Payload bodies are opaque [`Value`]s; this crate routes frames, it does
//! not interpret application data.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::CorrelationId;

// ============================================================================
// Frame
// ============================================================================

/// A single wire frame.
///
/// # Format
///
/// ```json
/// {"type": "request",  "id": "uuid", "payload": { ... }}
/// {"type": "response", "id": "uuid", "payload": { ... }, "error": null}
/// {"type": "push",     "event": "settings_updated", "payload": { ... }}
/// {"type": "ping"}
/// {"type": "pong"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Correlated command, client to service.
    Request {
        /// Correlation id matched by the eventual response.
        id: CorrelationId,
        /// Opaque request body.
        #[serde(default)]
        payload: Value,
    },

    /// Answer to a request, service to client.
    Response {
        /// Matches the request's `id`.
        id: CorrelationId,
        /// Opaque result body.
        #[serde(default)]
        payload: Value,
        /// Service-level error message, if the request failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Unsolicited notification, service to client.
    Push {
        /// Event name, e.g. `settings_updated`.
        #[serde(default)]
        event: String,
        /// Opaque event body.
        #[serde(default)]
        payload: Value,
    },

    /// Liveness probe.
    Ping,

    /// Liveness acknowledgment.
    Pong,
}

impl Frame {
    /// Creates a request frame.
    #[inline]
    #[must_use]
    pub fn request(id: CorrelationId, payload: Value) -> Self {
        Self::Request { id, payload }
    }

    /// Creates a successful response frame.
    #[inline]
    #[must_use]
    pub fn response(id: CorrelationId, payload: Value) -> Self {
        Self::Response {
            id,
            payload,
            error: None,
        }
    }

    /// Creates an error response frame.
    #[inline]
    #[must_use]
    pub fn error_response(id: CorrelationId, error: impl Into<String>) -> Self {
        Self::Response {
            id,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Returns the correlation id, for request and response frames.
    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } => Some(*id),
            _ => None,
        }
    }
}

// ============================================================================
// PushEvent
// ============================================================================

/// An unsolicited notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    /// Event name.
    pub event: String,
    /// Opaque event body.
    pub payload: Value,
}

// ============================================================================
// Tests
// ============================================================================
