//! Client configuration.
//!
//! Provides a type-safe interface for configuring the messaging client:
//! endpoint addresses, reconnect/backoff tuning, request timeout, queue
//! staleness horizon, and heartbeat interval.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use assistant_messaging::ClientConfig;
//!
//! let config = ClientConfig::new("ws://127.0.0.1:8000/ws")?
//!     .with_fallback_url("http://127.0.0.1:8000/chat/message")?
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_max_reconnect_attempts(5);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default backoff base delay (first retry).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default backoff cap.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Default maximum automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default timeout for the connection handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-request response timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default staleness horizon for queued messages (5 minutes).
pub const DEFAULT_QUEUE_HORIZON: Duration = Duration::from_secs(300);

/// Default heartbeat probe interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default period of the shared internal tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

// ============================================================================
// ClientConfig
// ============================================================================

/// Configuration for a [`Client`](crate::Client) instance.
///
/// Values only; all behavior lives in the connection state machine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Duplex (WebSocket) endpoint address.
    pub duplex_url: Url,

    /// Fallback (single-shot HTTP) endpoint address, if configured.
    pub fallback_url: Option<Url>,

    /// Backoff base delay: `delay = min(cap, base * 2^attempt)`.
    pub backoff_base: Duration,

    /// Backoff delay cap.
    pub backoff_cap: Duration,

    /// Automatic reconnect attempts before the machine goes terminally
    /// errored and waits for an explicit `connect()`.
    pub max_reconnect_attempts: u32,

    /// Timeout for the connection handshake.
    pub connect_timeout: Duration,

    /// Default per-request response timeout.
    pub request_timeout: Duration,

    /// Maximum age a queued message may reach before it is reported
    /// expired.
    pub queue_horizon: Duration,

    /// Interval between liveness probes while connected.
    pub heartbeat_interval: Duration,

    /// Unanswered probes tolerated before the connection is treated as
    /// lost. `None` disables the liveness check and relies on the
    /// transport's own close signaling.
    pub max_missed_pongs: Option<u32>,

    /// Period of the shared tick driving timeouts, queue eviction,
    /// heartbeat, and retry scheduling.
    pub tick_interval: Duration,
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientConfig {
    /// Creates a configuration for the given duplex endpoint with default
    /// tuning values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the URL cannot be parsed.
    pub fn new(duplex_url: impl AsRef<str>) -> Result<Self> {
        let duplex_url = Url::parse(duplex_url.as_ref())
            .map_err(|e| Error::connection(format!("invalid duplex URL: {e}")))?;

        Ok(Self {
            duplex_url,
            fallback_url: None,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_horizon: DEFAULT_QUEUE_HORIZON,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_missed_pongs: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
        })
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientConfig {
    /// Sets the fallback endpoint address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the URL cannot be parsed.
    pub fn with_fallback_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())
            .map_err(|e| Error::connection(format!("invalid fallback URL: {e}")))?;
        self.fallback_url = Some(url);
        Ok(self)
    }

    /// Sets the backoff base delay.
    #[inline]
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Sets the backoff delay cap.
    #[inline]
    #[must_use]
    pub fn with_backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = cap;
        self
    }

    /// Sets the maximum automatic reconnect attempts.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default per-request response timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the queue staleness horizon.
    #[inline]
    #[must_use]
    pub fn with_queue_horizon(mut self, horizon: Duration) -> Self {
        self.queue_horizon = horizon;
        self
    }

    /// Sets the heartbeat probe interval.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enables the pong-liveness check: after `count` unanswered probes
    /// the connection is treated as lost.
    #[inline]
    #[must_use]
    pub fn with_max_missed_pongs(mut self, count: u32) -> Self {
        self.max_missed_pongs = Some(count);
        self
    }

    /// Sets the shared tick period.
    #[inline]
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
