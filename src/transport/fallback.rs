//! Single-shot fallback transport.
//!
//! When the duplex channel is unusable, a fallback-tolerant send can be
//! delivered over a stateless request/response channel instead: one
//! attempt, a fixed timeout, no retry, no queuing. Failures surface as
//! [`Error::Transport`], never silently.
//!
//! The trait seam exists so the facade's race policy can be exercised
//! without a live HTTP endpoint.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Frame;

// ============================================================================
// Constants
// ============================================================================

/// Fixed timeout for a single fallback attempt.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// FallbackTransport
// ============================================================================

/// A stateless single request/response channel.
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    /// Delivers one request frame and returns the peer's answer frame.
    ///
    /// Exactly one attempt; there is exactly one outstanding call per
    /// invocation, so no correlation is required on this channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on any delivery or decode failure.
    async fn send_once(&self, request: Frame) -> Result<Frame>;
}

// ============================================================================
// HttpFallback
// ============================================================================

/// Fallback transport over HTTP POST.
///
/// Posts the request frame as JSON to the fallback endpoint and parses
/// the body as a response frame. The payload shape is identical to the
/// duplex channel's.
pub struct HttpFallback {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpFallback {
    /// Creates a fallback transport for the given endpoint with the
    /// default timeout.
    #[inline]
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout: DEFAULT_FALLBACK_TIMEOUT,
        }
    }

    /// Sets the per-attempt timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl FallbackTransport for HttpFallback {
    async fn send_once(&self, request: Frame) -> Result<Frame> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(format!("HTTP {status}")));
        }

        response
            .json::<Frame>()
            .await
            .map_err(|e| Error::transport(format!("invalid response body: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::CorrelationId;

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_transport_error() {
        // Bind a port to learn a free one, then drop the listener so the
        // connection is refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/chat/message")).expect("url");
        let fallback = HttpFallback::new(url).with_timeout(Duration::from_millis(500));

        let request = Frame::request(CorrelationId::generate(), json!({ "message": "hi" }));
        let err = fallback.send_once(request).await.expect_err("must fail");

        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_timeout_builder() {
        let url = Url::parse("http://127.0.0.1:8000/chat/message").expect("url");
        let fallback = HttpFallback::new(url).with_timeout(Duration::from_secs(5));
        assert_eq!(fallback.timeout, Duration::from_secs(5));
    }
}
