//! Request-scoped snapshot handles.
//!
//! A [`PublishedSnapshot`] pins one generation per store plus the domain list
//! as they were when it was created. It never observes later publishes
//! unless [`PublishedSnapshot::resync`] is called. Dropping it releases the
//! pinned generations and its snapshot cache.

use std::cell::Cell;
use std::sync::Arc;

use nucache_records::ItemKind;
use tracing::{debug, trace};

use crate::cache::config::CacheConfig;
use crate::cache::routes::RouteCache;
use crate::cache::scoped::ScopedCache;
use crate::content::{Generation, ValueScope};

use super::content_cache::ContentCache;
use super::domains::DomainCache;
use super::service::SharedState;

/// The generations a snapshot reads from.
#[derive(Clone)]
pub(crate) struct BoundGenerations {
    pub content: Arc<Generation>,
    pub media: Arc<Generation>,
    pub members: Arc<Generation>,
}

impl BoundGenerations {
    pub(crate) fn numbers(&self) -> [u64; 3] {
        [
            self.content.number(),
            self.media.number(),
            self.members.number(),
        ]
    }
}

/// Read handle over one consistent state of every store.
///
/// `Send` but not `Sync`: the forced-preview flag is a `Cell`, so a snapshot
/// belongs to one thread at a time. Background work that outlives a request
/// takes its own snapshot from the service rather than sharing one.
pub struct PublishedSnapshot {
    shared: Arc<SharedState>,
    default_preview: bool,
    preview: Cell<bool>,
    bound: BoundGenerations,
    domains: DomainCache,
    snapshot_cache: ScopedCache,
    elements_cache: Arc<ScopedCache>,
}

impl PublishedSnapshot {
    pub(crate) fn new(shared: Arc<SharedState>, preview: bool) -> Self {
        let bound = shared.bind_current();
        let elements_cache = shared.elements_cache_for(&bound);
        let domains = shared.domains.snapshot();
        debug!(
            preview,
            generations = ?bound.numbers(),
            "Snapshot created"
        );
        Self {
            shared,
            default_preview: preview,
            preview: Cell::new(preview),
            bound,
            domains,
            snapshot_cache: ScopedCache::new(),
            elements_cache,
        }
    }

    pub fn content(&self) -> ContentCache<'_> {
        ContentCache::new(self, &self.shared.stores.content, &self.bound.content, true)
    }

    pub fn media(&self) -> ContentCache<'_> {
        ContentCache::new(self, &self.shared.stores.media, &self.bound.media, true)
    }

    /// Member lookups never use preview.
    pub fn members(&self) -> ContentCache<'_> {
        ContentCache::new(self, &self.shared.stores.members, &self.bound.members, false)
    }

    pub fn cache(&self, kind: ItemKind) -> ContentCache<'_> {
        match kind {
            ItemKind::Content => self.content(),
            ItemKind::Media => self.media(),
            ItemKind::Member => self.members(),
        }
    }

    pub fn domains(&self) -> &DomainCache {
        &self.domains
    }

    /// The mode the snapshot was created with.
    pub fn default_preview(&self) -> bool {
        self.default_preview
    }

    pub fn is_previewing(&self) -> bool {
        self.preview.get()
    }

    /// Caches and routing for property value reads through this snapshot.
    pub fn value_scope(&self) -> ValueScope<'_> {
        ValueScope::new(
            &self.snapshot_cache,
            &self.elements_cache,
            self.is_previewing(),
            self.shared.policy,
        )
    }

    pub fn snapshot_cache(&self) -> &ScopedCache {
        &self.snapshot_cache
    }

    pub fn elements_cache(&self) -> &Arc<ScopedCache> {
        &self.elements_cache
    }

    /// Read in `preview` mode until the returned guard drops.
    ///
    /// On drop, normal or unwinding, the previous mode is restored and
    /// `callback` receives whether the forced mode differed from it.
    pub fn forced_preview<F>(&self, preview: bool, callback: F) -> ForcedPreview<'_, F>
    where
        F: FnOnce(bool),
    {
        let previous = self.preview.replace(preview);
        trace!(previous, forced = preview, "Forced preview entered");
        ForcedPreview {
            snapshot: self,
            previous,
            forced: preview,
            callback: Some(callback),
        }
    }

    /// Rebind to the stores' current generations.
    ///
    /// The snapshot cache is emptied since its values may refer to the old
    /// generations.
    pub fn resync(&mut self) {
        let before = self.bound.numbers();
        self.bound = self.shared.bind_current();
        self.elements_cache = self.shared.elements_cache_for(&self.bound);
        self.domains = self.shared.domains.snapshot();
        self.snapshot_cache.clear();
        debug!(?before, after = ?self.bound.numbers(), "Snapshot resynced");
    }

    pub(crate) fn routes(&self) -> &RouteCache {
        &self.shared.routes
    }

    pub(crate) fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    pub(crate) fn domains_are_current(&self) -> bool {
        self.shared.domains.is_current(&self.domains)
    }
}

impl Drop for PublishedSnapshot {
    fn drop(&mut self) {
        trace!(generations = ?self.bound.numbers(), "Snapshot released");
    }
}

/// Scope guard returned by [`PublishedSnapshot::forced_preview`].
pub struct ForcedPreview<'a, F: FnOnce(bool)> {
    snapshot: &'a PublishedSnapshot,
    previous: bool,
    forced: bool,
    callback: Option<F>,
}

impl<F: FnOnce(bool)> Drop for ForcedPreview<'_, F> {
    fn drop(&mut self) {
        self.snapshot.preview.set(self.previous);
        trace!(restored = self.previous, "Forced preview exited");
        if let Some(callback) = self.callback.take() {
            callback(self.previous != self.forced);
        }
    }
}
