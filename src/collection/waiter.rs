//! Bounded-poll consistency wait.
//!
//! The protocol delivers a method result and the collection diffs it implies
//! as independent, unordered frames. After a login call succeeds, the
//! corresponding `users` entry may not have arrived yet; callers reconcile
//! that race by waiting for the entry with a deadline.
//!
//! The wait polls [`CollectionStore::try_get`] at a short configurable
//! interval rather than registering a wake-up against the store. The poll
//! runs on the caller's task, never on the dispatch loop.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::trace;

use crate::error::{Error, Result};

use super::store::{Collection, CollectionStore};

// ============================================================================
// Constants
// ============================================================================

/// Default interval between polls of the store.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Wait
// ============================================================================

impl CollectionStore {
    /// Waits until the entry exists in the named collection.
    ///
    /// Resolves with the collection once `try_get` succeeds for `id`, even
    /// when the matching `added` diff is applied concurrently after the
    /// wait has started.
    ///
    /// # Errors
    ///
    /// [`Error::ConsistencyTimeout`] if no such entry appears within
    /// `deadline`.
    pub async fn wait_for_entry(
        &self,
        collection: &str,
        id: &str,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<Arc<Collection>> {
        let poll = async {
            loop {
                if let Some(found) = self.get(collection)
                    && found.contains(id)
                {
                    return found;
                }

                trace!(collection = %collection, id = %id, "Entry not present yet");
                sleep(poll_interval).await;
            }
        };

        timeout(deadline, poll).await.map_err(|_| {
            Error::consistency_timeout(collection, id, deadline.as_millis() as u64)
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::Fields;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_wait_resolves_for_existing_entry() {
        let store = CollectionStore::new();
        store.added("users", "u1", fields(&[("username", json!("alice"))]));

        let collection = store
            .wait_for_entry("users", "u1", DEFAULT_POLL_INTERVAL, Duration::from_secs(1))
            .await
            .expect("entry present");
        assert!(collection.contains("u1"));
    }

    #[tokio::test]
    async fn test_wait_resolves_against_concurrent_added() {
        let store = Arc::new(CollectionStore::new());

        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            writer.added("users", "u1", fields(&[("username", json!("alice"))]));
        });

        // Wait starts before the diff arrives.
        let collection = store
            .wait_for_entry("users", "u1", DEFAULT_POLL_INTERVAL, Duration::from_secs(2))
            .await
            .expect("entry eventually present");
        assert!(collection.contains("u1"));
    }

    #[tokio::test]
    async fn test_wait_times_out_without_entry() {
        let store = CollectionStore::new();

        let err = store
            .wait_for_entry("users", "never", DEFAULT_POLL_INTERVAL, Duration::from_millis(60))
            .await
            .expect_err("no entry arrives");
        assert!(matches!(err, Error::ConsistencyTimeout { .. }));
    }
}
