//! Mirrored collection storage.
//!
//! The store owns one [`Collection`] per distinct name, created lazily on
//! first reference and kept current by the dispatch loop applying
//! `added`/`changed`/`removed` diffs in strict arrival order. Each diff is
//! one atomic step under the collection's lock: readers never observe a
//! partially-applied diff.
//!
//! Diff semantics (conformance-tested, see the module tests):
//!
//! - `added` upserts; an `added` for an existing id fully replaces its
//!   field map. The server sends it as a correction, not an accumulation.
//! - `changed` merges field-by-field; present keys overwrite, absent keys
//!   stay untouched. A `changed` for an unknown id is a no-op.
//! - `removed` deletes if present.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::protocol::Fields;

// ============================================================================
// Collection
// ============================================================================

/// A client-local mirror of one named server-side data set.
///
/// Shared between the dispatch loop (sole writer) and arbitrary concurrent
/// readers. Lives for the lifetime of the owning connection object.
#[derive(Debug)]
pub struct Collection {
    /// Collection name.
    name: String,
    /// Entry id to field map.
    entries: RwLock<FxHashMap<String, Fields>>,
}

impl Collection {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the collection name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies an `added` diff: insert, or fully replace an existing entry.
    pub fn added(&self, id: impl Into<String>, fields: Fields) {
        let id = id.into();
        trace!(collection = %self.name, id = %id, "added");
        self.entries.write().insert(id, fields);
    }

    /// Applies a `changed` diff: merge fields into an existing entry.
    ///
    /// No-op when the id is unknown; the entry is not created.
    pub fn changed(&self, id: &str, fields: Fields) {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(id) else {
            trace!(collection = %self.name, id = %id, "changed for unknown id, skipping");
            return;
        };

        trace!(collection = %self.name, id = %id, "changed");
        for (key, value) in fields {
            entry.insert(key, value);
        }
    }

    /// Applies a `removed` diff: delete the entry if present.
    pub fn removed(&self, id: &str) {
        trace!(collection = %self.name, id = %id, "removed");
        self.entries.write().remove(id);
    }

    /// Returns a copy of the entry's field map, if present.
    #[must_use]
    pub fn try_get(&self, id: &str) -> Option<Fields> {
        self.entries.read().get(id).cloned()
    }

    /// Returns `true` if the entry exists.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Returns a point-in-time snapshot of all `(id, fields)` pairs.
    ///
    /// The snapshot is detached from live mutation; a fresh call yields a
    /// fresh snapshot.
    #[must_use]
    pub fn items(&self) -> Vec<(String, Fields)> {
        self.entries
            .read()
            .iter()
            .map(|(id, fields)| (id.clone(), fields.clone()))
            .collect()
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the collection has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ============================================================================
// CollectionStore
// ============================================================================

/// Owns all named mirrored collections for one connection.
///
/// Mutated only by the dispatch loop; read by arbitrary concurrent callers.
#[derive(Debug, Default)]
pub struct CollectionStore {
    collections: Mutex<FxHashMap<String, Arc<Collection>>>,
}

impl CollectionStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named collection, creating an empty one on first use.
    #[must_use]
    pub fn get_or_create(&self, name: &str) -> Arc<Collection> {
        let mut collections = self.collections.lock();
        if let Some(collection) = collections.get(name) {
            return Arc::clone(collection);
        }

        let collection = Arc::new(Collection::new(name));
        collections.insert(name.to_string(), Arc::clone(&collection));
        collection
    }

    /// Returns the named collection if it already exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.lock().get(name).map(Arc::clone)
    }

    /// Applies an `added` diff to the named collection.
    pub fn added(&self, collection: &str, id: impl Into<String>, fields: Fields) {
        self.get_or_create(collection).added(id, fields);
    }

    /// Applies a `changed` diff to the named collection.
    pub fn changed(&self, collection: &str, id: &str, fields: Fields) {
        self.get_or_create(collection).changed(id, fields);
    }

    /// Applies a `removed` diff to the named collection.
    pub fn removed(&self, collection: &str, id: &str) {
        self.get_or_create(collection).removed(id);
    }

    /// Returns a copy of an entry's field map, if the collection and entry
    /// both exist.
    #[must_use]
    pub fn try_get(&self, collection: &str, id: &str) -> Option<Fields> {
        self.get(collection)?.try_get(id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::{Value, json};

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = CollectionStore::new();
        let a = store.get_or_create("rooms");
        let b = store.get_or_create("rooms");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_get_does_not_create() {
        let store = CollectionStore::new();
        assert!(store.get("rooms").is_none());
        store.get_or_create("rooms");
        assert!(store.get("rooms").is_some());
    }

    #[test]
    fn test_added_replaces_existing_entry() {
        let store = CollectionStore::new();
        store.added("users", "u1", fields(&[("name", json!("alice")), ("status", json!("away"))]));
        store.added("users", "u1", fields(&[("name", json!("alice"))]));

        // Full replacement: "status" is gone, not carried over.
        let entry = store.try_get("users", "u1").expect("entry");
        assert_eq!(entry.len(), 1);
        assert_eq!(entry["name"], "alice");
    }

    #[test]
    fn test_changed_merges_fields() {
        let store = CollectionStore::new();
        store.added("users", "u1", fields(&[("name", json!("alice")), ("status", json!("away"))]));
        store.changed("users", "u1", fields(&[("status", json!("online"))]));

        let entry = store.try_get("users", "u1").expect("entry");
        assert_eq!(entry["name"], "alice");
        assert_eq!(entry["status"], "online");
    }

    #[test]
    fn test_changed_unknown_id_is_noop() {
        let store = CollectionStore::new();
        store.get_or_create("users");
        store.changed("users", "ghost", fields(&[("name", json!("casper"))]));

        assert!(store.try_get("users", "ghost").is_none());
        assert!(store.get("users").expect("collection").is_empty());
    }

    #[test]
    fn test_removed_unknown_id_is_noop() {
        let store = CollectionStore::new();
        store.added("users", "u1", fields(&[("name", json!("alice"))]));
        store.removed("users", "u2");
        assert_eq!(store.get("users").expect("collection").len(), 1);
    }

    #[test]
    fn test_message_lifecycle_scenario() {
        // added -> changed -> removed, observed through try_get at each step.
        let store = CollectionStore::new();

        store.added("messages", "m1", fields(&[("text", json!("hi"))]));
        assert_eq!(store.try_get("messages", "m1").expect("entry")["text"], "hi");

        store.changed("messages", "m1", fields(&[("text", json!("hi!"))]));
        assert_eq!(store.try_get("messages", "m1").expect("entry")["text"], "hi!");

        store.removed("messages", "m1");
        assert!(store.try_get("messages", "m1").is_none());
    }

    #[test]
    fn test_collection_renders_debug() {
        // Collections surface in assertion output and error context.
        let store = CollectionStore::new();
        store.added("users", "u1", fields(&[("name", json!("alice"))]));

        let rendered = format!("{:?}", store.get("users").expect("collection"));
        assert!(rendered.contains("users"));
    }

    #[test]
    fn test_items_snapshot_is_detached() {
        let store = CollectionStore::new();
        store.added("rooms", "r1", fields(&[("name", json!("general"))]));

        let collection = store.get("rooms").expect("collection");
        let snapshot = collection.items();

        store.removed("rooms", "r1");

        // The snapshot still holds the entry; a fresh one does not.
        assert_eq!(snapshot.len(), 1);
        assert!(collection.items().is_empty());
    }

    // ------------------------------------------------------------------------
    // Diff-fold property
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Diff {
        Added(String, Fields),
        Changed(String, Fields),
        Removed(String),
    }

    fn arb_fields() -> impl Strategy<Value = Fields> {
        proptest::collection::btree_map("[a-d]", "[a-z]{1,4}", 0..4).prop_map(|m| {
            m.into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect()
        })
    }

    fn arb_diff() -> impl Strategy<Value = Diff> {
        let id = "[a-c]";
        prop_oneof![
            (id, arb_fields()).prop_map(|(id, f)| Diff::Added(id, f)),
            (id, arb_fields()).prop_map(|(id, f)| Diff::Changed(id, f)),
            id.prop_map(Diff::Removed),
        ]
    }

    fn apply_all(store: &CollectionStore, diffs: &[Diff]) {
        for diff in diffs {
            match diff {
                Diff::Added(id, f) => store.added("c", id.clone(), f.clone()),
                Diff::Changed(id, f) => store.changed("c", id, f.clone()),
                Diff::Removed(id) => store.removed("c", id),
            }
        }
    }

    proptest! {
        /// The final entry set equals an in-order fold of the diffs, and
        /// replaying the same sequence from empty reproduces it exactly.
        #[test]
        fn prop_store_matches_in_order_fold(diffs in proptest::collection::vec(arb_diff(), 0..40)) {
            // Reference fold over a plain map.
            let mut reference: std::collections::BTreeMap<String, Fields> = Default::default();
            for diff in &diffs {
                match diff {
                    Diff::Added(id, f) => {
                        reference.insert(id.clone(), f.clone());
                    }
                    Diff::Changed(id, f) => {
                        if let Some(entry) = reference.get_mut(id) {
                            for (k, v) in f {
                                entry.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    Diff::Removed(id) => {
                        reference.remove(id);
                    }
                }
            }

            let store = CollectionStore::new();
            apply_all(&store, &diffs);
            let mut got: Vec<_> = store.get_or_create("c").items();
            got.sort_by(|a, b| a.0.cmp(&b.0));
            let want: Vec<_> = reference.clone().into_iter().collect();
            prop_assert_eq!(&got, &want);

            // Same sequence from empty, same final state.
            let replay = CollectionStore::new();
            apply_all(&replay, &diffs);
            let mut got2: Vec<_> = replay.get_or_create("c").items();
            got2.sort_by(|a, b| a.0.cmp(&b.0));
            prop_assert_eq!(&got2, &want);
        }
    }
}
