//! Authentication and session lifecycle.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `credentials` | [`Credentials`]: login parameter shapes |
//! | `manager` | [`SessionManager`]: login, resume, token rotation, reconnect handling |

// ============================================================================
// Submodules
// ============================================================================

/// Login credential shapes.
pub mod credentials;

/// The session state machine.
pub mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use credentials::Credentials;
pub use manager::{LOGIN_RETRY_DELAY, LOGIN_RETRY_LIMIT, Session, SessionManager, SessionState};
