//! The protocol engine: connection lifecycle, method calls, subscriptions.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | [`ClientConfig`]: endpoint, deadlines, backoff tunables |
//! | `connection` | [`DdpClient`] and the per-connection dispatch loop |
//! | `event` | [`ClientEvent`] notifications for consumers |
//! | `registry` | Pending-call and subscription registries |

// ============================================================================
// Submodules
// ============================================================================

/// Engine configuration and defaults.
pub mod config;

/// The client handle and dispatch loop.
pub mod connection;

/// Consumer-facing event notifications.
pub mod event;

/// Shared correlation registries.
mod registry;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{
    ClientConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_INITIAL_DELAY,
    DEFAULT_RECONNECT_MAX_DELAY, MAX_PENDING_CALLS,
};
pub use connection::DdpClient;
pub use event::ClientEvent;
