//! Login credential shapes.
//!
//! The login method accepts several credential forms; each serializes to the
//! exact parameter object the server expects. Passwords travel as a
//! caller-supplied SHA-256 digest, never in the clear; producing the digest
//! is the caller's concern.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

// ============================================================================
// Credentials
// ============================================================================

/// Credentials for a `login` method call.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Username plus SHA-256 password digest (lowercase hex).
    Username {
        /// Account username.
        username: String,
        /// `sha256(password)` as lowercase hex.
        digest: String,
    },

    /// Email address plus SHA-256 password digest (lowercase hex).
    Email {
        /// Account email address.
        email: String,
        /// `sha256(password)` as lowercase hex.
        digest: String,
    },

    /// LDAP-delegated login. The password is forwarded to the directory
    /// server, so it travels as given rather than as a digest.
    Ldap {
        /// Directory username.
        username: String,
        /// Directory password.
        password: String,
    },

    /// Resume a previous session from its auth token.
    Resume {
        /// Token returned by an earlier successful login.
        token: String,
    },
}

impl Credentials {
    /// Builds the parameter object for the `login` method call.
    #[must_use]
    pub fn to_login_param(&self) -> Value {
        match self {
            Self::Username { username, digest } => json!({
                "user": { "username": username },
                "password": { "digest": digest, "algorithm": "sha-256" },
            }),

            Self::Email { email, digest } => json!({
                "user": { "email": email },
                "password": { "digest": digest, "algorithm": "sha-256" },
            }),

            Self::Ldap { username, password } => json!({
                "username": username,
                "ldapPass": password,
                "ldap": true,
                "ldapOptions": {},
            }),

            Self::Resume { token } => json!({ "resume": token }),
        }
    }

    /// A loggable label for the credential kind; never includes secrets.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Username { .. } => "username",
            Self::Email { .. } => "email",
            Self::Ldap { .. } => "ldap",
            Self::Resume { .. } => "resume",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
