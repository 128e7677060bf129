//! Engine events delivered to consumers.
//!
//! Consumers register with [`EventListeners::register`] and receive events
//! over an unbounded channel; the engine never blocks on delivery, and a
//! dropped receiver is pruned on the next emission. The listener set is
//! owned by the client instance, so its lifecycle ends with the connection
//! object rather than living in global state.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::Fields;

// ============================================================================
// ClientEvent
// ============================================================================

/// A notification raised by the protocol engine.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A `changed` diff was applied to the named collection.
    ///
    /// Raised after the diff is in the store, so a read from the handler
    /// observes the merged state.
    CollectionChanged {
        /// Collection name.
        collection: String,
        /// Fields carried by the diff.
        fields: Fields,
    },

    /// The transport was re-established after a disconnect.
    ///
    /// Emitted exactly once per physical reconnect. The engine does not
    /// relogin or resubscribe; the consumer (typically the session manager)
    /// must do so before treating the connection as usable.
    ReconnectRequested,
}

// ============================================================================
// EventListeners
// ============================================================================

/// The engine's set of registered event consumers.
#[derive(Default)]
pub(crate) struct EventListeners {
    senders: Mutex<Vec<mpsc::UnboundedSender<ClientEvent>>>,
}

impl EventListeners {
    /// Registers a new listener and returns its receiving end.
    pub fn register(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        rx
    }

    /// Delivers an event to every live listener, pruning dropped ones.
    pub fn emit(&self, event: &ClientEvent) {
        trace!(?event, "Emitting client event");
        self.senders
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

// ============================================================================
// Tests
// ============================================================================
