//! DDP protocol frame types.
//!
//! This module defines the wire format exchanged with the server. It is a
//! pure codec layer: the [`client`](crate::client) module owns all state.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Client/server frame enums and the `RemoteError` payload |

// ============================================================================
// Submodules
// ============================================================================

/// Frame definitions and the stateless JSON codec.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{ClientFrame, Fields, PROTOCOL_VERSION, RemoteError, ServerFrame};
