//! DDP frame types and codec.
//!
//! Every transport message carries exactly one frame, encoded as a JSON
//! object tagged by its `msg` field. The codec is stateless: encoding a
//! [`ClientFrame`] and classifying an inbound text into a [`ServerFrame`]
//! never touch connection state.
//!
//! # Frame Kinds
//!
//! | Kind | Direction | Purpose |
//! |------|-----------|---------|
//! | `connect` / `connected` / `failed` | C→S / S→C | Handshake |
//! | `method` / `result` / `updated` | C→S / S→C | Remote method calls |
//! | `sub` / `unsub` / `ready` / `nosub` | C→S / S→C | Subscriptions |
//! | `added` / `changed` / `removed` | S→C | Collection diffs |
//! | `ping` / `pong` | both | Heartbeat |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, from_str, to_string};
use tracing::{debug, warn};

use crate::error::Result;
use crate::identifiers::{MethodId, SubscriptionId};

// ============================================================================
// Types
// ============================================================================

/// Raw field map of a collection entry.
pub type Fields = Map<String, Value>;

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: &str = "1";

// ============================================================================
// ClientFrame
// ============================================================================

/// A frame sent from client to server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Handshake request.
    Connect {
        /// Preferred protocol version.
        version: String,
        /// All versions the client supports.
        support: Vec<String>,
    },

    /// Remote method invocation.
    Method {
        /// Method name.
        method: String,
        /// Positional arguments.
        params: Vec<Value>,
        /// Correlation id echoed back in the `result` frame.
        id: MethodId,
    },

    /// Subscription request.
    Sub {
        /// Correlation id echoed back in `ready`/`nosub` frames.
        id: SubscriptionId,
        /// Publication name.
        name: String,
        /// Positional arguments.
        params: Vec<Value>,
    },

    /// Subscription cancellation.
    Unsub {
        /// Id of the subscription to cancel.
        id: SubscriptionId,
    },

    /// Heartbeat request.
    Ping {
        /// Optional id echoed back in the matching `pong`.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Heartbeat reply.
    Pong {
        /// Echo of the server ping's id, if it carried one.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ClientFrame {
    /// Creates the handshake frame for [`PROTOCOL_VERSION`].
    #[inline]
    #[must_use]
    pub fn connect() -> Self {
        Self::Connect {
            version: PROTOCOL_VERSION.to_string(),
            support: vec![PROTOCOL_VERSION.to_string()],
        }
    }

    /// Encodes the frame as a JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

// ============================================================================
// ServerFrame
// ============================================================================

/// A frame received from the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Handshake accepted.
    Connected {
        /// Server-assigned DDP session id.
        session: String,
    },

    /// Handshake rejected; server proposes a different version.
    Failed {
        /// Version the server would accept.
        version: String,
    },

    /// Method call outcome.
    Result {
        /// Correlation id of the originating `method` frame.
        id: MethodId,
        /// Success payload, if any.
        #[serde(default)]
        result: Option<Value>,
        /// Explicit server-side error payload, if any.
        #[serde(default)]
        error: Option<RemoteError>,
    },

    /// Server-side writes of listed method calls have been flushed.
    Updated {
        /// Method ids whose writes are reflected in the data stream.
        methods: Vec<MethodId>,
    },

    /// Initial data for the listed subscriptions has been delivered.
    Ready {
        /// Subscription ids that are now ready.
        subs: Vec<SubscriptionId>,
    },

    /// Subscription rejected or terminated.
    Nosub {
        /// Id of the affected subscription.
        id: SubscriptionId,
        /// Server-provided reason, if any.
        #[serde(default)]
        error: Option<RemoteError>,
    },

    /// Entry added to a collection (or fully replaced, if the id exists).
    Added {
        /// Collection name.
        collection: String,
        /// Entry id.
        id: String,
        /// Entry fields.
        #[serde(default)]
        fields: Option<Fields>,
    },

    /// Fields merged into an existing collection entry.
    Changed {
        /// Collection name.
        collection: String,
        /// Entry id.
        id: String,
        /// Fields to merge; present keys overwrite, absent keys untouched.
        #[serde(default)]
        fields: Option<Fields>,
    },

    /// Entry removed from a collection.
    Removed {
        /// Collection name.
        collection: String,
        /// Entry id.
        id: String,
    },

    /// Heartbeat request; must be answered with a `pong`.
    Ping {
        /// Optional id to echo back.
        #[serde(default)]
        id: Option<String>,
    },

    /// Heartbeat reply to a client-initiated `ping`.
    Pong {
        /// Echo of the ping's id, if it carried one.
        #[serde(default)]
        id: Option<String>,
    },
}

impl ServerFrame {
    /// Classifies one inbound text message.
    ///
    /// Returns `None` for anything that is not a recognized frame: unknown
    /// `msg` kinds, malformed payloads, and bare non-frame objects such as
    /// the `server_id` banner some servers emit on connect. All of these are
    /// logged and must never stop the dispatch loop.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match from_str::<Self>(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                // Distinguish "not a frame at all" from a malformed known kind.
                match from_str::<Value>(text) {
                    Ok(value) if value.get("msg").is_none() => {
                        debug!(text = %text, "Ignoring non-frame message");
                    }
                    Ok(value) => {
                        let kind = value
                            .get("msg")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        warn!(kind = %kind, error = %e, "Ignoring unrecognized frame");
                    }
                    Err(_) => {
                        warn!(error = %e, "Ignoring unparseable message");
                    }
                }
                None
            }
        }
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// An explicit error payload attached to a `result` or `nosub` frame.
///
/// The `error` field is a string or numeric code depending on server
/// version, so it is kept as a raw [`Value`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error code; string or number depending on server version.
    #[serde(default)]
    pub error: Value,

    /// Human-readable reason.
    #[serde(default)]
    pub reason: Option<String>,

    /// Longer message, when distinct from the reason.
    #[serde(default)]
    pub message: Option<String>,

    /// Server-side error class (e.g. `Meteor.Error`).
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
}

impl RemoteError {
    /// Creates a remote error from a code and reason.
    #[inline]
    #[must_use]
    pub fn new(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error: Value::String(error.into()),
            reason: Some(reason.into()),
            message: None,
            error_type: None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = self
            .reason
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or("unspecified");
        write!(f, "{} ({})", detail, self.error)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_frame_encoding() {
        let json = ClientFrame::connect().encode().expect("encode");
        assert!(json.contains(r#""msg":"connect""#));
        assert!(json.contains(r#""version":"1""#));
        assert!(json.contains(r#""support":["1"]"#));
    }

    #[test]
    fn test_method_frame_encoding() {
        let id = MethodId::generate();
        let frame = ClientFrame::Method {
            method: "sendMessage".to_string(),
            params: vec![json!({"msg": "hi", "rid": "r1"})],
            id,
        };

        let json = frame.encode().expect("encode");
        assert!(json.contains(r#""msg":"method""#));
        assert!(json.contains(r#""method":"sendMessage""#));
        assert!(json.contains(&id.to_string()));
    }

    #[test]
    fn test_ping_omits_absent_id() {
        let json = ClientFrame::Ping { id: None }.encode().expect("encode");
        assert_eq!(json, r#"{"msg":"ping"}"#);
    }

    #[test]
    fn test_pong_echoes_id() {
        let frame = ClientFrame::Pong {
            id: Some("hb-1".to_string()),
        };
        assert_eq!(frame.encode().expect("encode"), r#"{"msg":"pong","id":"hb-1"}"#);
    }

    #[test]
    fn test_parse_connected() {
        let frame = ServerFrame::parse(r#"{"msg":"connected","session":"abc123"}"#);
        assert!(matches!(
            frame,
            Some(ServerFrame::Connected { session }) if session == "abc123"
        ));
    }

    #[test]
    fn test_parse_result_success() {
        let id = MethodId::generate();
        let text = format!(r#"{{"msg":"result","id":"{id}","result":{{"token":"t"}}}}"#);

        match ServerFrame::parse(&text) {
            Some(ServerFrame::Result { id: got, result, error }) => {
                assert_eq!(got, id);
                assert_eq!(result.unwrap()["token"], "t");
                assert!(error.is_none());
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_result_error_payload() {
        let id = MethodId::generate();
        let text = format!(
            r#"{{"msg":"result","id":"{id}","error":{{"error":403,"reason":"Forbidden","errorType":"Meteor.Error"}}}}"#
        );

        match ServerFrame::parse(&text) {
            Some(ServerFrame::Result { error: Some(err), .. }) => {
                assert_eq!(err.error, json!(403));
                assert_eq!(err.reason.as_deref(), Some("Forbidden"));
                assert_eq!(err.to_string(), "Forbidden (403)");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_changed_diff() {
        let text = r#"{"msg":"changed","collection":"messages","id":"m1","fields":{"text":"hi!"}}"#;

        match ServerFrame::parse(text) {
            Some(ServerFrame::Changed { collection, id, fields }) => {
                assert_eq!(collection, "messages");
                assert_eq!(id, "m1");
                assert_eq!(fields.unwrap()["text"], "hi!");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ready_lists_subs() {
        let sub = SubscriptionId::generate();
        let text = format!(r#"{{"msg":"ready","subs":["{sub}"]}}"#);

        match ServerFrame::parse(&text) {
            Some(ServerFrame::Ready { subs }) => assert_eq!(subs, vec![sub]),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_kind_is_ignored() {
        assert!(ServerFrame::parse(r#"{"msg":"totally-new-thing","x":1}"#).is_none());
    }

    #[test]
    fn test_parse_server_id_banner_is_ignored() {
        assert!(ServerFrame::parse(r#"{"server_id":"0"}"#).is_none());
    }

    #[test]
    fn test_parse_garbage_is_ignored() {
        assert!(ServerFrame::parse("not json at all").is_none());
    }
}
