//! Session lifecycle on top of the protocol engine.
//!
//! [`SessionManager`] drives the authentication state machine:
//!
//! ```text
//! Anonymous -> Authenticating -> Authenticated -> Reauthenticating -> Authenticated
//! ```
//!
//! with a terminal `Failed` state reachable from any non-terminal state on
//! an unrecoverable login error; only a fresh [`login`](SessionManager::login)
//! leaves `Failed`.
//!
//! The engine emits [`ClientEvent::ReconnectRequested`] after a transport
//! re-establishment; the consumer of that event must invoke
//! [`handle_reconnect`](SessionManager::handle_reconnect) before treating
//! the connection as usable, which resumes the session from its token and
//! reasserts all registered subscriptions.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::DdpClient;
use crate::error::{Error, Result};

use super::credentials::Credentials;

// ============================================================================
// Constants
// ============================================================================

/// Extra login attempts after a call timeout, beyond the first try.
pub const LOGIN_RETRY_LIMIT: usize = 2;

/// First delay between login retries; doubles per attempt.
pub const LOGIN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Deadline for the profile entry to appear in the `users` collection.
const PROFILE_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

/// Authentication state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No authentication performed or attempted.
    Anonymous,
    /// A fresh login is in flight.
    Authenticating,
    /// Logged in; token and user id are held.
    Authenticated,
    /// Resuming from the held token after a reconnect.
    Reauthenticating,
    /// Unrecoverable login failure; only a fresh login leaves this state.
    Failed,
}

/// The authenticated identity.
#[derive(Debug, Clone)]
pub struct Session {
    /// Server-assigned user id.
    pub user_id: String,
    /// Auth token; usable with [`Credentials::Resume`].
    pub token: String,
    /// Token expiry in epoch milliseconds, when the server reports one.
    pub token_expires: Option<i64>,
    /// Username resolved from the `users` collection after login.
    pub username: Option<String>,
}

/// Successful `login` result payload.
#[derive(Debug, Deserialize)]
struct LoginReply {
    id: String,
    token: String,
    #[serde(rename = "tokenExpires")]
    token_expires: Option<EpochMillis>,
}

/// Dates arrive as `{"$date": <millis>}` wrappers.
#[derive(Debug, Deserialize)]
struct EpochMillis {
    #[serde(rename = "$date")]
    millis: i64,
}

// ============================================================================
// SessionManager
// ============================================================================

/// Login, resume, and token rotation for one [`DdpClient`].
pub struct SessionManager {
    client: DdpClient,
    state: Mutex<SessionState>,
    session: Mutex<Option<Session>>,
}

impl SessionManager {
    /// Creates a manager over a connected client.
    #[must_use]
    pub fn new(client: DdpClient) -> Self {
        Self {
            client,
            state: Mutex::new(SessionState::Anonymous),
            session: Mutex::new(None),
        }
    }

    /// Returns the current authentication state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Returns a snapshot of the authenticated identity, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    /// Returns the active auth token, if logged in.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.token.clone())
    }

    /// Returns the authenticated user id, if logged in.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.user_id.clone())
    }

    /// Returns the underlying client handle.
    #[inline]
    #[must_use]
    pub fn client(&self) -> &DdpClient {
        &self.client
    }

    // ========================================================================
    // Login & Resume
    // ========================================================================

    /// Authenticates with the given credentials.
    ///
    /// On success the token and user id are stored and the username is
    /// resolved from the `users` collection, reconciling the race between
    /// the login result and the profile diff. A missing profile entry is
    /// logged but does not fail the login.
    ///
    /// A [`Error::CallTimeout`] is retried up to [`LOGIN_RETRY_LIMIT`] extra
    /// times with doubling delay; the retry count is bounded so a dead
    /// server cannot spin the login forever.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] for rejected credentials; the session enters
    ///   `Failed`
    /// - [`Error::CallTimeout`] once retries are exhausted
    /// - [`Error::Session`] if a login is already in flight
    pub async fn login(&self, credentials: Credentials) -> Result<Session> {
        self.authenticate(credentials, false).await
    }

    /// Resumes a session from a previously issued token.
    ///
    /// # Errors
    ///
    /// As for [`login`](Self::login), plus [`Error::Session`] when the
    /// session is in `Failed` (a resume cannot leave that state).
    pub async fn resume(&self, token: impl Into<String>) -> Result<Session> {
        if self.state() == SessionState::Failed {
            return Err(Error::session(
                "session has failed; a fresh login is required",
            ));
        }
        self.authenticate(
            Credentials::Resume {
                token: token.into(),
            },
            false,
        )
        .await
    }

    /// Re-establishes session state after a reconnect.
    ///
    /// Invoked by the consumer of the reconnect event, synchronously before
    /// other traffic: resumes from the held token (if any), then reasserts
    /// every registered subscription. Until both complete, collection reads
    /// may reflect pre-disconnect state.
    ///
    /// # Errors
    ///
    /// Resume errors as for [`login`](Self::login); a failed resume leaves
    /// subscriptions unasserted.
    pub async fn handle_reconnect(&self) -> Result<()> {
        let token = self.token();

        if let Some(token) = token {
            debug!("Resuming session after reconnect");
            self.authenticate(Credentials::Resume { token }, true)
                .await?;
        }

        let count = self.client.reassert_subscriptions()?;
        info!(subscriptions = count, "Reconnect handling complete");
        Ok(())
    }

    async fn authenticate(&self, credentials: Credentials, reauth: bool) -> Result<Session> {
        {
            let mut state = self.state.lock();
            if matches!(
                *state,
                SessionState::Authenticating | SessionState::Reauthenticating
            ) {
                return Err(Error::session("login already in progress"));
            }
            *state = if reauth {
                SessionState::Reauthenticating
            } else {
                SessionState::Authenticating
            };
        }

        debug!(kind = credentials.kind(), "Logging in");

        let value = match self.call_login(&credentials).await {
            Ok(value) => value,
            Err(e) => {
                // Rejected credentials are unrecoverable; transient
                // failures fall back to the pre-login state.
                *self.state.lock() = if e.is_remote() {
                    SessionState::Failed
                } else if reauth {
                    SessionState::Authenticated
                } else {
                    SessionState::Anonymous
                };
                return Err(e);
            }
        };

        let reply: LoginReply = serde_json::from_value(value).map_err(|e| {
            *self.state.lock() = SessionState::Failed;
            Error::session(format!("malformed login reply: {e}"))
        })?;

        let mut session = Session {
            user_id: reply.id,
            token: reply.token,
            token_expires: reply.token_expires.map(|d| d.millis),
            username: None,
        };

        *self.session.lock() = Some(session.clone());
        *self.state.lock() = SessionState::Authenticated;
        info!(user_id = %session.user_id, "Authenticated");

        session.username = self.resolve_username(&session.user_id).await;
        if let Some(username) = &session.username
            && let Some(held) = self.session.lock().as_mut()
        {
            held.username = Some(username.clone());
        }

        Ok(session)
    }

    /// Issues the `login` call, retrying a bounded number of timeouts.
    async fn call_login(&self, credentials: &Credentials) -> Result<Value> {
        let mut delay = LOGIN_RETRY_DELAY;
        let mut retries = 0;

        loop {
            match self
                .client
                .call("login", vec![credentials.to_login_param()])
                .await
            {
                Err(e) if matches!(e, Error::CallTimeout { .. }) && retries < LOGIN_RETRY_LIMIT => {
                    retries += 1;
                    warn!(
                        retry = retries,
                        max = LOGIN_RETRY_LIMIT,
                        delay_ms = delay.as_millis() as u64,
                        "Login timed out, retrying"
                    );
                    sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }
    }

    /// Waits for the profile entry and reads its username.
    ///
    /// The login result and the `users` diff arrive as independent frames,
    /// so the entry may not exist yet when the call resolves.
    async fn resolve_username(&self, user_id: &str) -> Option<String> {
        match self
            .client
            .wait_for_entry("users", user_id, PROFILE_WAIT_TIMEOUT)
            .await
        {
            Ok(users) => {
                let username = users
                    .try_get(user_id)
                    .and_then(|fields| fields.get("username").cloned())
                    .and_then(|v| v.as_str().map(String::from));
                if username.is_none() {
                    warn!(user_id = %user_id, "Profile entry has no username");
                }
                username
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile entry did not arrive");
                None
            }
        }
    }

    // ========================================================================
    // Token Rotation & Logout
    // ========================================================================

    /// Rotates the auth token and invalidates all other sessions.
    ///
    /// The new token is committed only after the invalidation call
    /// succeeds; a partial failure leaves the current token active so this
    /// session cannot lock itself out.
    ///
    /// # Errors
    ///
    /// - [`Error::Session`] when not authenticated
    /// - Any call error from either server method; the held token is
    ///   unchanged in every failure case
    pub async fn rotate_tokens(&self) -> Result<String> {
        if self.state() != SessionState::Authenticated {
            return Err(Error::session("token rotation requires an active session"));
        }

        let value = self.client.call("getNewToken", vec![]).await?;
        let reply: LoginReply = serde_json::from_value(value)
            .map_err(|e| Error::session(format!("malformed token reply: {e}")))?;

        // Invalidate first; commit only on success.
        self.client.call("removeOtherTokens", vec![]).await?;

        if let Some(session) = self.session.lock().as_mut() {
            session.token = reply.token.clone();
            session.token_expires = reply.token_expires.map(|d| d.millis);
        }

        info!("Rotated auth token");
        Ok(reply.token)
    }

    /// Logs out and returns to `Anonymous`.
    ///
    /// # Errors
    ///
    /// Any call error from the `logout` method; the local session is
    /// cleared regardless.
    pub async fn logout(&self) -> Result<()> {
        let outcome = self.client.call("logout", vec![]).await;

        *self.session.lock() = None;
        *self.state.lock() = SessionState::Anonymous;

        outcome.map(|_| ())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::client::testutil::{TestPeer, connected_client, connected_client_with, test_config};

    fn password_creds() -> Credentials {
        Credentials::Username {
            username: "bot".to_string(),
            digest: "d1".to_string(),
        }
    }

    /// Replies to a `login` call and delivers the matching profile diff.
    async fn accept_login(peer: &mut TestPeer) -> Value {
        let frame = peer.recv_json().await;
        assert_eq!(frame["msg"], "method");
        assert_eq!(frame["method"], "login");

        peer.send(format!(
            r#"{{"msg":"result","id":"{}","result":{{"id":"u1","token":"tok-1","tokenExpires":{{"$date":1700000000000}}}}}}"#,
            frame["id"].as_str().expect("id")
        ));
        peer.send(r#"{"msg":"added","collection":"users","id":"u1","fields":{"username":"bot"}}"#);

        frame
    }

    #[tokio::test]
    async fn test_login_stores_session_and_username() {
        let (client, mut peer, _accepts) = connected_client().await;
        let manager = Arc::new(SessionManager::new(client));

        let logging_in = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login(password_creds()).await })
        };

        let frame = accept_login(&mut peer).await;
        assert_eq!(frame["params"][0]["user"]["username"], "bot");
        assert_eq!(frame["params"][0]["password"]["algorithm"], "sha-256");

        let session = logging_in.await.expect("join").expect("login");
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.token, "tok-1");
        assert_eq!(session.token_expires, Some(1_700_000_000_000));
        assert_eq!(session.username.as_deref(), Some("bot"));
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(manager.token().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_login_rejection_enters_failed_state() {
        let (client, mut peer, _accepts) = connected_client().await;
        let manager = Arc::new(SessionManager::new(client));

        let logging_in = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login(password_creds()).await })
        };

        let frame = peer.recv_json().await;
        peer.send(format!(
            r#"{{"msg":"result","id":"{}","error":{{"error":403,"reason":"Incorrect password"}}}}"#,
            frame["id"].as_str().expect("id")
        ));

        let err = logging_in.await.expect("join").expect_err("rejected");
        assert!(err.is_remote());
        assert_eq!(manager.state(), SessionState::Failed);

        // Resume cannot leave Failed.
        let err = manager.resume("tok-x").await.expect_err("refused");
        assert!(matches!(err, Error::Session { .. }));

        // A fresh login can.
        let logging_in = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login(password_creds()).await })
        };
        accept_login(&mut peer).await;
        logging_in.await.expect("join").expect("fresh login");
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_login_retries_after_call_timeout() {
        let config = test_config().call_timeout(Duration::from_millis(50));
        let (client, mut peer, _accepts) = connected_client_with(config).await;
        let manager = Arc::new(SessionManager::new(client));

        let logging_in = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login(password_creds()).await })
        };

        // First attempt goes unanswered; the retry succeeds.
        let first = peer.recv_json().await;
        assert_eq!(first["method"], "login");

        accept_login(&mut peer).await;

        let session = logging_in.await.expect("join").expect("retried login");
        assert_eq!(session.user_id, "u1");
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_resume_sends_token() {
        let (client, mut peer, _accepts) = connected_client().await;
        let manager = Arc::new(SessionManager::new(client));

        let resuming = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.resume("tok-old").await })
        };

        let frame = accept_login(&mut peer).await;
        assert_eq!(frame["params"][0]["resume"], "tok-old");

        resuming.await.expect("join").expect("resumed");
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_rotate_tokens_commits_after_invalidation() {
        let (client, mut peer, _accepts) = connected_client().await;
        let manager = Arc::new(SessionManager::new(client));

        let logging_in = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login(password_creds()).await })
        };
        accept_login(&mut peer).await;
        logging_in.await.expect("join").expect("login");

        let rotating = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.rotate_tokens().await })
        };

        let frame = peer.recv_json().await;
        assert_eq!(frame["method"], "getNewToken");
        peer.send(format!(
            r#"{{"msg":"result","id":"{}","result":{{"id":"u1","token":"tok-2"}}}}"#,
            frame["id"].as_str().expect("id")
        ));

        let frame = peer.recv_json().await;
        assert_eq!(frame["method"], "removeOtherTokens");
        peer.send(format!(
            r#"{{"msg":"result","id":"{}","result":null}}"#,
            frame["id"].as_str().expect("id")
        ));

        let token = rotating.await.expect("join").expect("rotated");
        assert_eq!(token, "tok-2");
        assert_eq!(manager.token().as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn test_failed_invalidation_keeps_current_token() {
        let (client, mut peer, _accepts) = connected_client().await;
        let manager = Arc::new(SessionManager::new(client));

        let logging_in = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login(password_creds()).await })
        };
        accept_login(&mut peer).await;
        logging_in.await.expect("join").expect("login");

        let rotating = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.rotate_tokens().await })
        };

        let frame = peer.recv_json().await;
        assert_eq!(frame["method"], "getNewToken");
        peer.send(format!(
            r#"{{"msg":"result","id":"{}","result":{{"id":"u1","token":"tok-2"}}}}"#,
            frame["id"].as_str().expect("id")
        ));

        let frame = peer.recv_json().await;
        assert_eq!(frame["method"], "removeOtherTokens");
        peer.send(format!(
            r#"{{"msg":"result","id":"{}","error":{{"error":500,"reason":"Internal server error"}}}}"#,
            frame["id"].as_str().expect("id")
        ));

        let err = rotating.await.expect("join").expect_err("rotation failed");
        assert!(err.is_remote());
        assert_eq!(manager.token().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_handle_reconnect_resumes_and_resubscribes() {
        let (client, mut peer, mut accepts) = connected_client().await;
        let manager = Arc::new(SessionManager::new(client.clone()));

        let logging_in = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login(password_creds()).await })
        };
        accept_login(&mut peer).await;
        logging_in.await.expect("join").expect("login");

        let sub_id = client
            .subscribe("stream-room-messages", vec![])
            .expect("subscribe");
        let _ = peer.recv_json().await;

        drop(peer);
        let mut peer = accepts.recv().await.expect("reconnect attempt");
        peer.accept_handshake().await;

        let handling = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.handle_reconnect().await })
        };

        let frame = peer.recv_json().await;
        assert_eq!(frame["method"], "login");
        assert_eq!(frame["params"][0]["resume"], "tok-1");
        peer.send(format!(
            r#"{{"msg":"result","id":"{}","result":{{"id":"u1","token":"tok-1"}}}}"#,
            frame["id"].as_str().expect("id")
        ));
        peer.send(r#"{"msg":"added","collection":"users","id":"u1","fields":{"username":"bot"}}"#);

        let frame = peer.recv_json().await;
        assert_eq!(frame["msg"], "sub");
        assert_eq!(frame["name"], "stream-room-messages");
        assert_eq!(frame["id"], sub_id.to_string());

        handling.await.expect("join").expect("reconnect handled");
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let (client, mut peer, _accepts) = connected_client().await;
        let manager = Arc::new(SessionManager::new(client));

        let logging_in = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.login(password_creds()).await })
        };
        accept_login(&mut peer).await;
        logging_in.await.expect("join").expect("login");

        let logging_out = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.logout().await })
        };

        let frame = peer.recv_json().await;
        assert_eq!(frame["method"], "logout");
        peer.send(format!(
            r#"{{"msg":"result","id":"{}","result":null}}"#,
            frame["id"].as_str().expect("id")
        ));

        logging_out.await.expect("join").expect("logout");
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(manager.token().is_none());
    }
}
