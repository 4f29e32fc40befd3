//! Reconnect backoff policy.
//!
//! Pure function from attempt count to retry delay. Deterministic and
//! monotonically non-decreasing up to the cap, so repeated handshake
//! failures back off instead of busy-looping.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// BackoffPolicy
// ============================================================================

/// Exponential backoff: `delay = min(cap, base * 2^attempt)`.
///
/// No state, no side effects. The connection state machine passes its
/// reconnect counter in; an explicit `connect()` resets that counter and
/// the delays start over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay for attempt 0.
    base: Duration,
    /// Upper bound on the delay.
    cap: Duration,
}

impl BackoffPolicy {
    /// Creates a policy with the given base and cap.
    ///
    /// A zero base or a cap below the base would defeat the policy
    /// (delays of zero busy-loop the reconnect), so the base is clamped
    /// up to one millisecond and the cap up to the base.
    #[inline]
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let cap = cap.max(base);
        Self { base, cap }
    }

    /// Returns the delay before the given retry attempt.
    ///
    /// Attempt numbering starts at 0; the multiplier saturates, so large
    /// attempt counts simply return the cap.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(multiplier).min(self.cap)
    }
}

// ============================================================================
// Tests
// ============================================================================
