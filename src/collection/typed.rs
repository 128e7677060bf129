//! Typed projections over raw collections.
//!
//! A [`TypedCollection`] decodes the raw field map into a caller-supplied
//! record shape on every read. Nothing is cached, so a projection always
//! reflects the latest merged fields.

// ============================================================================
// Imports
// ============================================================================

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::store::Collection;

// ============================================================================
// TypedCollection
// ============================================================================

/// A read-only, typed view over a [`Collection`].
///
/// Entries that fail to decode into `T` are skipped with a warning rather
/// than failing the whole read; a mirror can legitimately hold entries of
/// mixed shape while diffs are still streaming in.
pub struct TypedCollection<T> {
    inner: Arc<Collection>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedCollection<T> {
    /// Wraps a raw collection in a typed view.
    #[inline]
    #[must_use]
    pub fn new(inner: Arc<Collection>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying collection name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Decodes the entry with the given id.
    ///
    /// Returns `None` if the entry is absent or does not decode into `T`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<T> {
        let fields = self.inner.try_get(id)?;
        match serde_json::from_value(Value::Object(fields)) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(
                    collection = %self.inner.name(),
                    id = %id,
                    error = %e,
                    "Entry does not decode into projected type"
                );
                None
            }
        }
    }

    /// Decodes a point-in-time snapshot of all entries.
    #[must_use]
    pub fn items(&self) -> Vec<(String, T)> {
        self.inner
            .items()
            .into_iter()
            .filter_map(|(id, fields)| {
                match serde_json::from_value(Value::Object(fields)) {
                    Ok(decoded) => Some((id, decoded)),
                    Err(e) => {
                        warn!(
                            collection = %self.inner.name(),
                            id = %id,
                            error = %e,
                            "Skipping entry that does not decode into projected type"
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
