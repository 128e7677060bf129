//! Client configuration.
//!
//! Tunables for the protocol engine: endpoint, deadlines, reconnect backoff,
//! and the consistency-poll interval. Defaults are suitable for a typical
//! chat-server deployment; override with the chainable setters.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::collection::DEFAULT_POLL_INTERVAL;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for connect and handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for method calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending calls before rejecting new ones.
pub const MAX_PENDING_CALLS: usize = 100;

/// First reconnect backoff delay.
pub const DEFAULT_RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Backoff cap for reconnect attempts.
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// ClientConfig
// ============================================================================

/// Configuration for a [`DdpClient`](crate::DdpClient).
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use ddp_client::ClientConfig;
/// use url::Url;
///
/// let config = ClientConfig::new(Url::parse("wss://chat.example.com/websocket").unwrap())
///     .call_timeout(Duration::from_secs(10))
///     .reconnect_initial_delay(Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server WebSocket endpoint.
    pub url: Url,

    /// Deadline for transport open plus handshake.
    pub connect_timeout: Duration,

    /// Default deadline for method calls.
    pub call_timeout: Duration,

    /// Maximum concurrently pending calls.
    pub max_pending_calls: usize,

    /// First delay before a reconnect attempt.
    pub reconnect_initial_delay: Duration,

    /// Upper bound for the doubling reconnect backoff.
    pub reconnect_max_delay: Duration,

    /// Poll interval for the consistency waiter.
    pub consistency_poll_interval: Duration,
}

impl ClientConfig {
    /// Creates a configuration with defaults for the given endpoint.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_pending_calls: MAX_PENDING_CALLS,
            reconnect_initial_delay: DEFAULT_RECONNECT_INITIAL_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            consistency_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the connect/handshake deadline.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default method call deadline.
    #[inline]
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the pending-call cap.
    #[inline]
    #[must_use]
    pub fn max_pending_calls(mut self, max: usize) -> Self {
        self.max_pending_calls = max;
        self
    }

    /// Sets the first reconnect backoff delay.
    #[inline]
    #[must_use]
    pub fn reconnect_initial_delay(mut self, delay: Duration) -> Self {
        self.reconnect_initial_delay = delay;
        self
    }

    /// Sets the reconnect backoff cap.
    #[inline]
    #[must_use]
    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = delay;
        self
    }

    /// Sets the consistency waiter's poll interval.
    #[inline]
    #[must_use]
    pub fn consistency_poll_interval(mut self, interval: Duration) -> Self {
        self.consistency_poll_interval = interval;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
