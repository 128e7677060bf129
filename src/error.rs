//! Error types for the DDP client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ddp_client::{Result, Error};
//!
//! async fn example(client: &DdpClient) -> Result<()> {
//!     let result = client.call("getStatistics", vec![]).await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Connection | [`Error::Connect`], [`Error::ConnectTimeout`], [`Error::ConnectionLost`] |
//! | Method calls | [`Error::CallTimeout`], [`Error::Remote`] |
//! | Subscriptions | [`Error::Subscription`], [`Error::SubscriptionTimeout`] |
//! | Consistency | [`Error::ConsistencyTimeout`] |
//! | Session | [`Error::Session`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! [`Error::Remote`] deserves a note: a server returning an explicit error
//! payload for a method call is a normal protocol outcome, not a transport
//! fault. It still travels on the `Err` channel so callers can use `?`, and
//! [`Error::is_remote`] separates it from infrastructure failures.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{MethodId, SubscriptionId};
use crate::protocol::RemoteError;

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
    // Connection Errors
    // ========================================================================
    /// Handshake or transport failure at connect time.
    ///
    /// Returned when the connection cannot be established, including a
    /// server-side version rejection (`failed` frame).
    #[error("Connect failed: {message}")]
    Connect {
        /// Description of the connect failure.
        message: String,
    },

    /// Connect deadline expired before the `connected` frame arrived.
    #[error("Connect timeout after {timeout_ms}ms")]
    ConnectTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection was lost while operations were in flight.
    ///
    /// Every pending call and subscription waiter receives this when the
    /// transport closes; none are held across a reconnect.
    #[error("Connection lost")]
    ConnectionLost,

    // ========================================================================
    // Method Call Errors
    // ========================================================================
    /// No `result` frame arrived within the call deadline.
    ///
    /// The pending entry is removed on timeout; a result frame arriving
    /// later is discarded, never delivered.
    #[error("Call {method_id} timed out after {timeout_ms}ms")]
    CallTimeout {
        /// Correlation id of the timed-out call.
        method_id: MethodId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The server answered the call with an explicit error payload.
    ///
    /// This is an ordinary protocol outcome (bad credentials, unknown
    /// method, validation failure), not a transport fault.
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    // ========================================================================
    // Subscription Errors
    // ========================================================================
    /// The server rejected the subscription with a `nosub` frame.
    #[error("Subscription {id} to '{name}' rejected: {message}")]
    Subscription {
        /// The rejected subscription id.
        id: SubscriptionId,
        /// Publication name.
        name: String,
        /// Server-provided reason, if any.
        message: String,
    },

    /// No `ready` frame listed the subscription within the deadline.
    #[error("Subscription to '{name}' not ready after {timeout_ms}ms")]
    SubscriptionTimeout {
        /// Publication name.
        name: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Consistency Errors
    // ========================================================================
    /// The awaited collection entry never appeared within the deadline.
    #[error("Entry '{id}' in collection '{collection}' not observed after {timeout_ms}ms")]
    ConsistencyTimeout {
        /// Collection name.
        collection: String,
        /// Awaited entry id.
        id: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Session state machine violation or unrecoverable login failure.
    #[error("Session error: {message}")]
    Session {
        /// Description of the session error.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected frame content.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
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
    /// Creates a connect error.
    #[inline]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a connect timeout error.
    #[inline]
    pub fn connect_timeout(timeout_ms: u64) -> Self {
        Self::ConnectTimeout { timeout_ms }
    }

    /// Creates a call timeout error.
    #[inline]
    pub fn call_timeout(method_id: MethodId, timeout_ms: u64) -> Self {
        Self::CallTimeout {
            method_id,
            timeout_ms,
        }
    }

    /// Creates a subscription rejection error.
    #[inline]
    pub fn subscription(
        id: SubscriptionId,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Subscription {
            id,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a subscription wait timeout error.
    #[inline]
    pub fn subscription_timeout(name: impl Into<String>, timeout_ms: u64) -> Self {
        Self::SubscriptionTimeout {
            name: name.into(),
            timeout_ms,
        }
    }

    /// Creates a consistency wait timeout error.
    #[inline]
    pub fn consistency_timeout(
        collection: impl Into<String>,
        id: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self::ConsistencyTimeout {
            collection: collection.into(),
            id: id.into(),
            timeout_ms,
        }
    }

    /// Creates a session error.
    #[inline]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
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
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::CallTimeout { .. }
                | Self::SubscriptionTimeout { .. }
                | Self::ConsistencyTimeout { .. }
        )
    }

    /// Returns `true` if the server answered with an explicit error payload.
    ///
    /// Remote errors are ordinary protocol outcomes, not faults.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::ConnectTimeout { .. }
                | Self::ConnectionLost
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
            Self::ConnectTimeout { .. }
                | Self::CallTimeout { .. }
                | Self::SubscriptionTimeout { .. }
                | Self::ConsistencyTimeout { .. }
                | Self::ConnectionLost
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
