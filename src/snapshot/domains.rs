//! Domain assignments.
//!
//! The whole list is swapped on every change; snapshots keep the list they
//! were created with.

use std::sync::Arc;

use arc_swap::ArcSwap;
use nucache_records::DomainRecord;
use tracing::debug;

/// Current domain list, replaced wholesale by the consumer.
pub struct DomainStore {
    current: ArcSwap<Vec<DomainRecord>>,
}

impl DomainStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn replace(&self, domains: Vec<DomainRecord>) {
        debug!(domains = domains.len(), "Domains replaced");
        self.current.store(Arc::new(domains));
    }

    pub fn snapshot(&self) -> DomainCache {
        DomainCache {
            domains: self.current.load_full(),
        }
    }

    /// Whether `cache` still sees the current list.
    pub fn is_current(&self, cache: &DomainCache) -> bool {
        Arc::ptr_eq(&self.current.load(), &cache.domains)
    }
}

impl Default for DomainStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Domains as seen by one snapshot.
#[derive(Debug, Clone)]
pub struct DomainCache {
    domains: Arc<Vec<DomainRecord>>,
}

impl DomainCache {
    pub fn all(&self, include_wildcards: bool) -> impl Iterator<Item = &DomainRecord> {
        self.domains
            .iter()
            .filter(move |domain| include_wildcards || !domain.is_wildcard)
    }

    /// Domains attached to `content_id`.
    pub fn assigned(
        &self,
        content_id: i32,
        include_wildcards: bool,
    ) -> impl Iterator<Item = &DomainRecord> {
        self.all(include_wildcards)
            .filter(move |domain| domain.root_content_id == content_id)
    }

    /// Whether a non-wildcard domain is attached to `content_id`.
    pub fn has_assigned(&self, content_id: i32) -> bool {
        self.assigned(content_id, false).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
