//! Scoped value caches backing the `Elements` and `Snapshot` cache levels.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use super::keys::PropertyCacheKey;
use super::value::CacheValues;

/// A concurrent map of per-property memo tables.
///
/// Each entry carries its own mutex; the map itself only serializes entry
/// creation. An elements cache lives as long as the generations it was
/// created for; a snapshot cache lives as long as its snapshot.
#[derive(Debug, Default)]
pub struct ScopedCache {
    entries: DashMap<PropertyCacheKey, Arc<Mutex<CacheValues>>>,
}

impl ScopedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The memo table for one property, created empty on first access.
    pub fn values(&self, key: &PropertyCacheKey) -> Arc<Mutex<CacheValues>> {
        if let Some(entry) = self.entries.get(key) {
            return Arc::clone(entry.value());
        }
        Arc::clone(self.entries.entry(key.clone()).or_default().value())
    }

    pub fn contains(&self, key: &PropertyCacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
