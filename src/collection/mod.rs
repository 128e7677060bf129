//! Mirrored collections and consistency primitives.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `store` | [`CollectionStore`] and [`Collection`]: diff application and snapshot reads |
//! | `typed` | [`TypedCollection`]: decode-per-read projections |
//! | `waiter` | Bounded-poll wait for an entry to appear |

// ============================================================================
// Submodules
// ============================================================================

/// Named collection mirrors and diff application.
pub mod store;

/// Typed projections over raw field maps.
pub mod typed;

/// Bounded-poll consistency wait.
pub mod waiter;

// ============================================================================
// Re-exports
// ============================================================================

pub use store::{Collection, CollectionStore};
pub use typed::TypedCollection;
pub use waiter::DEFAULT_POLL_INTERVAL;
