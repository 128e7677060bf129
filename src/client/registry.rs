//! Pending-call and subscription registries.
//!
//! Both registries are shared between caller tasks (which register new
//! entries) and the dispatch loop (which resolves them). Every lock is held
//! only for a bounded critical section; all suspension happens on the
//! callers' own oneshot receivers.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{MethodId, SubscriptionId};

// ============================================================================
// PendingCalls
// ============================================================================

/// Correlation registry for outstanding method calls.
///
/// Exactly one resolution is ever delivered per entry: the dispatch loop
/// removes the entry when resolving, and a timed-out caller removes its own
/// entry so a late result frame finds nothing to resolve.
#[derive(Default)]
pub(crate) struct PendingCalls {
    map: FxHashMap<MethodId, oneshot::Sender<Result<Value>>>,
}

impl PendingCalls {
    /// Registers a pending call.
    pub fn insert(&mut self, id: MethodId, tx: oneshot::Sender<Result<Value>>) {
        self.map.insert(id, tx);
    }

    /// Removes and returns the entry, if still outstanding.
    pub fn remove(&mut self, id: &MethodId) -> Option<oneshot::Sender<Result<Value>>> {
        self.map.remove(id)
    }

    /// Resolves the entry with the given outcome.
    ///
    /// Returns `false` when no entry exists, which is how a late result for
    /// a timed-out call gets discarded.
    pub fn resolve(&mut self, id: &MethodId, outcome: Result<Value>) -> bool {
        match self.map.remove(id) {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fails every outstanding call with [`Error::ConnectionLost`].
    pub fn fail_all(&mut self) {
        let count = self.map.len();
        for (_, tx) in self.map.drain() {
            let _ = tx.send(Err(Error::ConnectionLost));
        }

        if count > 0 {
            debug!(count, "Failed pending calls");
        }
    }

    /// Returns the number of outstanding calls.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// One registered subscription.
pub(crate) struct SubscriptionEntry {
    /// Publication name.
    pub name: String,
    /// Positional arguments the subscription was issued with.
    pub params: Vec<Value>,
    /// Whether the server has delivered the initial data set.
    pub ready: bool,
    /// Callers suspended in `subscribe_and_wait`.
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

/// Registry of all subscriptions issued on this connection.
///
/// Entries are never implicitly destroyed; a `nosub` or an explicit
/// `unsubscribe` removes them, a disconnect only clears readiness.
#[derive(Default)]
pub(crate) struct Subscriptions {
    map: FxHashMap<SubscriptionId, SubscriptionEntry>,
}

impl Subscriptions {
    /// Registers a subscription, optionally with an initial readiness waiter.
    pub fn insert(
        &mut self,
        id: SubscriptionId,
        name: impl Into<String>,
        params: Vec<Value>,
        waiter: Option<oneshot::Sender<Result<()>>>,
    ) {
        self.map.insert(
            id,
            SubscriptionEntry {
                name: name.into(),
                params,
                ready: false,
                waiters: waiter.into_iter().collect(),
            },
        );
    }

    /// Marks the subscription ready and wakes its waiters.
    ///
    /// Returns `false` for unknown ids. Readiness is monotonic: it stays
    /// set until the connection drops or the subscription is reissued.
    pub fn mark_ready(&mut self, id: &SubscriptionId) -> bool {
        let Some(entry) = self.map.get_mut(id) else {
            return false;
        };

        entry.ready = true;
        for waiter in entry.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        true
    }

    /// Removes the subscription and fails its waiters (`nosub` handling).
    ///
    /// Returns the publication name when the id was known.
    pub fn reject(&mut self, id: SubscriptionId, reason: Option<String>) -> Option<String> {
        let entry = self.map.remove(&id)?;
        let message = reason.unwrap_or_else(|| "subscription ended by server".to_string());

        for waiter in entry.waiters {
            let _ = waiter.send(Err(Error::subscription(id, &entry.name, message.clone())));
        }
        Some(entry.name)
    }

    /// Attaches a readiness waiter, resolving immediately if already ready.
    pub fn add_waiter(&mut self, id: &SubscriptionId, waiter: oneshot::Sender<Result<()>>) {
        match self.map.get_mut(id) {
            Some(entry) if entry.ready => {
                let _ = waiter.send(Ok(()));
            }
            Some(entry) => entry.waiters.push(waiter),
            None => {
                let _ = waiter.send(Err(Error::ConnectionLost));
            }
        }
    }

    /// Clears readiness everywhere and fails all waiters (disconnect).
    ///
    /// Entries survive so the session layer can reissue them after the
    /// reconnect completes.
    pub fn connection_lost(&mut self) {
        for entry in self.map.values_mut() {
            entry.ready = false;
            for waiter in entry.waiters.drain(..) {
                let _ = waiter.send(Err(Error::ConnectionLost));
            }
        }
    }

    /// Removes a subscription entry (explicit unsubscribe path).
    pub fn remove(&mut self, id: &SubscriptionId) -> Option<SubscriptionEntry> {
        self.map.remove(id)
    }

    /// Returns `true` if the subscription is currently marked ready.
    pub fn is_ready(&self, id: &SubscriptionId) -> bool {
        self.map.get(id).is_some_and(|entry| entry.ready)
    }

    /// Returns the publication name of a registered subscription.
    pub fn name_of(&self, id: &SubscriptionId) -> Option<String> {
        self.map.get(id).map(|entry| entry.name.clone())
    }

    /// Returns a snapshot of `(id, name, params)` for every registered
    /// subscription, for reassertion after reconnect.
    pub fn snapshot(&self) -> Vec<(SubscriptionId, String, Vec<Value>)> {
        self.map
            .iter()
            .map(|(id, entry)| (*id, entry.name.clone(), entry.params.clone()))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
