//! DDP client - Real-time pub/sub and RPC over WebSocket.
//!
//! This library implements the client side of the DDP wire protocol used by
//! Meteor-style servers: remote method calls, live subscriptions, and a
//! consistent client-side mirror of server collections.
//!
//! # Architecture
//!
//! The client follows a single-dispatcher model:
//!
//! - **Caller tasks**: issue `call`/`subscribe` and suspend on their own
//!   wait handles
//! - **Dispatch loop**: one task per connection reads frames in arrival
//!   order and resolves the matching registry entries
//!
//! Key design principles:
//!
//! - Each [`DdpClient`] owns: transport + registries + dispatch loop
//! - Collection diffs apply synchronously in frame-arrival order
//! - Timed-out operations withdraw their registry entry, so late server
//!   responses are discarded rather than resurrecting them
//! - Reconnects are surfaced as a single event; relogin and resubscribe
//!   are driven by the [`SessionManager`], never by the engine
//!
//! # Quick Start
//!
//! ```no_run
//! use ddp_client::{ClientConfig, Credentials, DdpClient, Result, SessionManager};
//! use serde_json::json;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let url = Url::parse("wss://chat.example.com/websocket").unwrap();
//!     let client = DdpClient::new(ClientConfig::new(url));
//!     client.connect().await?;
//!
//!     // Authenticate and mirror a room's messages
//!     let session = SessionManager::new(client.clone());
//!     session
//!         .login(Credentials::Username {
//!             username: "bot".into(),
//!             digest: "…sha-256 hex…".into(),
//!         })
//!         .await?;
//!
//!     client
//!         .subscribe_and_wait("stream-room-messages", vec![json!("general")], None)
//!         .await?;
//!
//!     let result = client.call("getStatistics", vec![]).await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Protocol engine: [`DdpClient`], dispatch loop, events |
//! | [`collection`] | Mirrored collections and the consistency waiter |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire frame types (internal) |
//! | [`session`] | Login, resume, token rotation |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Protocol engine: connection lifecycle, calls, subscriptions.
///
/// Use [`DdpClient::new`] with a [`ClientConfig`] and call
/// [`DdpClient::connect`] before issuing traffic.
pub mod client;

/// Mirrored collections.
///
/// This module contains the client-side view of server state:
///
/// - [`CollectionStore`] - named collections, diff application
/// - [`TypedCollection`] - decode-per-read projections
/// - `wait_for_entry` - bounded-poll consistency wait
pub mod collection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire frame types.
///
/// Internal module defining the client/server frame structures.
pub mod protocol;

/// Authentication and session lifecycle.
///
/// Use [`SessionManager`] over a connected client for login, resume,
/// token rotation, and reconnect handling.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module; swap implementations via the [`transport::Connector`]
/// trait.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Engine types
pub use client::{ClientConfig, ClientEvent, DdpClient};

// Collection types
pub use collection::{Collection, CollectionStore, TypedCollection};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{MethodId, SubscriptionId};

// Protocol types
pub use protocol::RemoteError;

// Session types
pub use session::{Credentials, Session, SessionManager, SessionState};
