//! Duplex transport layer.
//!
//! The protocol engine talks to the server through the [`Transport`] trait:
//! a duplex channel of text messages, each carrying exactly one frame. The
//! [`Connector`] trait re-opens the transport after closure, which also
//! gives tests a seam to substitute an in-memory channel transport.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | Production implementation over `tokio-tungstenite` |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport implementation.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::{WebSocketConnector, WebSocketTransport};

// ============================================================================
// Transport
// ============================================================================

/// A duplex text-message channel to the server.
///
/// Implementations own the underlying socket; the engine owns framing and
/// everything above it.
#[async_trait]
pub trait Transport: Send {
    /// Sends one text message.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receives the next text message.
    ///
    /// Returns `None` once the channel is closed; `Some(Err(_))` signals a
    /// transport fault, after which the channel must be treated as closed.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Closes the channel. Errors during close are ignored.
    async fn close(&mut self);
}

// ============================================================================
// Connector
// ============================================================================

/// Factory that opens a fresh [`Transport`].
///
/// Used once for the initial connect and again for every reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new transport to the configured endpoint.
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}
