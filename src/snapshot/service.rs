//! Snapshot service.
//!
//! Owns the stores, caches and event pipeline, and hands out snapshots.

use std::sync::{Arc, Mutex};

use nucache_records::{ContentNodeKit, ItemKind};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::application::repos::{ContentSource, ContentTypeSource};
use crate::cache::config::{CacheConfig, ElementsCachePolicy};
use crate::cache::consumer::ChangeConsumer;
use crate::cache::content_types::PublishedContentTypeCache;
use crate::cache::events::EventQueue;
use crate::cache::lock::mutex_lock;
use crate::cache::routes::RouteCache;
use crate::cache::scoped::ScopedCache;
use crate::cache::trigger::CacheTrigger;
use crate::content::{ContentStores, Generation};
use crate::domain::error::CacheError;
use crate::domain::value::ConverterRegistry;

use super::domains::DomainStore;
use super::handle::{BoundGenerations, PublishedSnapshot};

const SOURCE: &str = "snapshot::service";

/// Elements cache of the latest generation triple.
#[derive(Default)]
struct ElementsSlot {
    generations: Option<[u64; 3]>,
    cache: Arc<ScopedCache>,
}

/// State shared by the service and every snapshot it creates.
pub(crate) struct SharedState {
    pub(crate) config: CacheConfig,
    pub(crate) policy: ElementsCachePolicy,
    pub(crate) stores: ContentStores,
    pub(crate) domains: Arc<DomainStore>,
    pub(crate) routes: Arc<RouteCache>,
    elements: Mutex<ElementsSlot>,
}

impl SharedState {
    pub(crate) fn bind_current(&self) -> BoundGenerations {
        BoundGenerations {
            content: self.stores.content.create_snapshot(),
            media: self.stores.media.create_snapshot(),
            members: self.stores.members.create_snapshot(),
        }
    }

    /// Snapshots on the same generations share one elements cache. A snapshot
    /// bound to superseded generations gets a private one.
    pub(crate) fn elements_cache_for(&self, bound: &BoundGenerations) -> Arc<ScopedCache> {
        let numbers = bound.numbers();
        let mut slot = mutex_lock(&self.elements, SOURCE, "elements_cache_for");
        if slot.generations == Some(numbers) {
            return Arc::clone(&slot.cache);
        }

        let cache = Arc::new(ScopedCache::new());
        let is_latest = self.stores.content.is_current(&bound.content)
            && self.stores.media.is_current(&bound.media)
            && self.stores.members.is_current(&bound.members);
        if is_latest {
            debug!(generations = ?numbers, "Elements cache replaced");
            slot.generations = Some(numbers);
            slot.cache = Arc::clone(&cache);
        }
        cache
    }
}

/// Generation and cache counters.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub stores: Vec<StoreStats>,
    pub content_types: usize,
    pub routes_live: usize,
    pub routes_preview: usize,
    pub pending_events: usize,
    pub domains: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub kind: ItemKind,
    pub generation: u64,
    pub nodes: usize,
    pub tombstones: usize,
    pub live_generations: usize,
}

/// Entry point for readers and writers of the cache.
pub struct PublishedSnapshotService {
    shared: Arc<SharedState>,
    types: Arc<PublishedContentTypeCache>,
    consumer: Arc<ChangeConsumer>,
    trigger: CacheTrigger,
}

impl PublishedSnapshotService {
    pub fn new(
        config: CacheConfig,
        type_source: Arc<dyn ContentTypeSource>,
        content_source: Arc<dyn ContentSource>,
        converters: ConverterRegistry,
    ) -> Self {
        let stores = ContentStores::new();
        let domains = Arc::new(DomainStore::new());
        let routes = Arc::new(RouteCache::new(&config));
        let types = Arc::new(PublishedContentTypeCache::new(type_source, converters));
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(ChangeConsumer::new(
            config.clone(),
            Arc::clone(&queue),
            stores.clone(),
            Arc::clone(&domains),
            Arc::clone(&types),
            Arc::clone(&routes),
            content_source,
        ));
        let trigger = CacheTrigger::new(queue, Arc::clone(&consumer));

        info!(
            route_cache_limit = config.route_cache_limit,
            hide_top_level_node = config.hide_top_level_node,
            full_cache_when_previewing = config.full_cache_when_previewing,
            "Snapshot service created"
        );

        Self {
            shared: Arc::new(SharedState {
                policy: config.elements_policy(),
                config,
                stores,
                domains,
                routes,
                elements: Mutex::new(ElementsSlot::default()),
            }),
            types,
            consumer,
            trigger,
        }
    }

    /// Build every store from the content source.
    #[instrument(skip(self))]
    pub fn load_all(&self) -> Result<(), CacheError> {
        self.consumer.rebuild()
    }

    /// Replace one store with a generation built from `kits`, parents first.
    pub fn bulk_load(
        &self,
        kind: ItemKind,
        kits: Vec<ContentNodeKit>,
    ) -> Result<Arc<Generation>, CacheError> {
        let generation = self
            .shared
            .stores
            .get(kind)
            .bulk_load(kits, self.types.as_ref())?;
        if kind == ItemKind::Content {
            self.shared.routes.clear();
        }
        Ok(generation)
    }

    pub fn create_snapshot(&self, preview: bool) -> PublishedSnapshot {
        PublishedSnapshot::new(Arc::clone(&self.shared), preview)
    }

    /// Run `f` with a snapshot that is released when `f` returns or unwinds.
    pub fn with_snapshot<R>(&self, preview: bool, f: impl FnOnce(&PublishedSnapshot) -> R) -> R {
        let snapshot = self.create_snapshot(preview);
        f(&snapshot)
    }

    pub fn trigger(&self) -> &CacheTrigger {
        &self.trigger
    }

    pub fn content_types(&self) -> &Arc<PublishedContentTypeCache> {
        &self.types
    }

    pub fn stores(&self) -> &ContentStores {
        &self.shared.stores
    }

    pub fn routes(&self) -> &Arc<RouteCache> {
        &self.shared.routes
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> CacheStats {
        let stores = ItemKind::ALL
            .into_iter()
            .map(|kind| {
                let store = self.shared.stores.get(kind);
                let generation = store.create_snapshot();
                StoreStats {
                    kind,
                    generation: generation.number(),
                    nodes: generation.len(),
                    tombstones: generation.tombstones(),
                    live_generations: store.live_generations(),
                }
            })
            .collect();
        CacheStats {
            stores,
            content_types: self.types.len(),
            routes_live: self.shared.routes.len(false),
            routes_preview: self.shared.routes.len(true),
            pending_events: self.trigger.queue().len(),
            domains: self.shared.domains.snapshot().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use crate::domain::value::PropertyValue;
    use crate::domain::variant::VariantKey;
    use crate::infra::memory::MemorySource;
    use crate::infra::memory::tests::site_seed;

    use super::*;

    fn service_with(config: CacheConfig) -> (Arc<MemorySource>, PublishedSnapshotService) {
        let source = Arc::new(MemorySource::new(site_seed()));
        let service = PublishedSnapshotService::new(
            config,
            source.clone(),
            source.clone(),
            ConverterRegistry::new(),
        );
        service.load_all().expect("load");
        (source, service)
    }

    fn service() -> (Arc<MemorySource>, PublishedSnapshotService) {
        service_with(CacheConfig::default())
    }

    #[test]
    fn routes_follow_hide_top_level_rules() {
        let (_, service) = service();
        let snapshot = service.create_snapshot(false);
        let content = snapshot.content();

        assert_eq!(content.get_route_by_id(1046).as_deref(), Some("/"));
        assert_eq!(content.get_route_by_id(1173).as_deref(), Some("/sub1"));
        assert_eq!(content.get_route_by_id(1176).as_deref(), Some("/sub1/sub-3"));
        assert_eq!(content.get_route_by_id(1172).as_deref(), Some("1172/"));
        assert_eq!(content.get_route_by_id(1180).as_deref(), Some("1172/localized"));
        assert_eq!(content.get_route_by_id(1177), None);
        assert_eq!(content.get_route_by_id(9999), None);
    }

    #[test]
    fn routes_resolve_back_to_nodes() {
        let (_, service) = service();
        let snapshot = service.create_snapshot(false);
        let content = snapshot.content();

        let id = |route: &str| content.get_by_route(route).map(|c| c.id());
        assert_eq!(id("/"), Some(1046));
        assert_eq!(id("/sub1/sub2"), Some(1174));
        assert_eq!(id("/SUB-2"), Some(1175));
        assert_eq!(id("/test"), Some(1172));
        assert_eq!(id("1172/localized"), Some(1180));
        assert_eq!(id("/nope"), None);
        assert_eq!(id("abc/def"), None);
        assert_eq!(id("no-slash"), None);

        // canonical routes end up in the route cache
        assert_eq!(service.routes().id_by_route("/sub1/sub2", false), Some(1174));
    }

    #[test]
    fn shown_top_level_segments_are_part_of_routes() {
        let (_, service) = service_with(CacheConfig {
            hide_top_level_node: false,
            ..CacheConfig::default()
        });
        let snapshot = service.create_snapshot(false);
        let content = snapshot.content();

        assert_eq!(content.get_route_by_id(1046).as_deref(), Some("/home"));
        assert_eq!(content.get_route_by_id(1174).as_deref(), Some("/home/sub1/sub2"));
        assert_eq!(content.get_by_route("/home/sub-2").map(|c| c.id()), Some(1175));
        assert_eq!(content.get_by_route("/").map(|c| c.id()), Some(1046));
    }

    #[test]
    fn preview_sees_drafts_and_draft_only_routes() {
        let (_, service) = service();
        service.with_snapshot(true, |snapshot| {
            let content = snapshot.content();
            assert!(content.has_by_id(1177));
            assert_eq!(
                content.get_route_by_id(1177).as_deref(),
                Some("/sub1/custom-sub-1")
            );
            let children: Vec<_> = content.children_of(1173).iter().map(|c| c.id()).collect();
            assert_eq!(children, vec![1174, 1176, 1177]);
        });
        assert_eq!(service.routes().route(1177, false), None);
        assert!(service.routes().route(1177, true).is_some());
    }

    #[test]
    fn members_never_preview() {
        let (_, service) = service();
        let snapshot = service.create_snapshot(true);
        assert!(snapshot.content().is_previewing());
        assert!(!snapshot.members().is_previewing());
        assert_eq!(
            snapshot.members().get_by_id(4000).expect("member").name(None),
            "jane"
        );
    }

    #[test]
    fn forced_preview_restores_mode_on_unwind() {
        let (_, service) = service();
        let snapshot = service.create_snapshot(false);
        let changed = Cell::new(None);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = snapshot.forced_preview(true, |c| changed.set(Some(c)));
            assert!(snapshot.content().get_by_id(1177).is_some());
            panic!("request failed");
        }));

        assert!(result.is_err());
        assert_eq!(changed.get(), Some(true));
        assert!(!snapshot.is_previewing());
        assert!(snapshot.content().get_by_id(1177).is_none());
    }

    #[test]
    fn forced_preview_reports_no_change_when_already_previewing() {
        let (_, service) = service();
        let snapshot = service.create_snapshot(true);
        let changed = Cell::new(None);
        {
            let _guard = snapshot.forced_preview(true, |c| changed.set(Some(c)));
        }
        assert_eq!(changed.get(), Some(false));
        assert!(snapshot.is_previewing());
    }

    #[test]
    fn snapshots_on_one_generation_share_the_elements_cache() {
        let (_, service) = service();
        let first = service.create_snapshot(false);
        let second = service.create_snapshot(false);
        assert!(Arc::ptr_eq(first.elements_cache(), second.elements_cache()));

        service.trigger().remove(ItemKind::Content, 1175).expect("remove");
        let third = service.create_snapshot(false);
        assert!(!Arc::ptr_eq(first.elements_cache(), third.elements_cache()));
    }

    #[test]
    fn resync_observes_newer_generations() {
        let (source, service) = service();
        let mut snapshot = service.create_snapshot(false);

        source.remove_node(ItemKind::Content, 1175);
        service
            .trigger()
            .apply_changes(&[1175], ItemKind::Content)
            .expect("apply");

        assert!(snapshot.content().get_by_id(1175).is_some());
        snapshot.resync();
        assert!(snapshot.content().get_by_id(1175).is_none());
    }

    #[test]
    fn old_snapshots_do_not_populate_routes() {
        let (_, service) = service();
        let old = service.create_snapshot(false);
        service.trigger().remove(ItemKind::Content, 1175).expect("remove");

        assert_eq!(old.content().get_route_by_id(1175).as_deref(), Some("/sub-2"));
        assert_eq!(service.routes().route(1175, false), None);
    }

    #[test]
    fn property_values_read_through_the_snapshot() {
        let (_, service) = service();
        let snapshot = service.create_snapshot(false);
        let home = snapshot.content().get_by_id(1046).expect("home");
        let scope = snapshot.value_scope();

        assert!(home.has_value("hidden", &VariantKey::invariant()).expect("has value"));
        let hidden = home
            .value(&scope, "hidden", &VariantKey::invariant())
            .expect("value");
        assert_eq!(*hidden, PropertyValue::Boolean(true));

        let localized = snapshot.content().get_by_id(1180).expect("localized");
        let title = localized
            .value(&scope, "title", &VariantKey::culture("da-DK"))
            .expect("title");
        assert_eq!(title.as_str(), Some("Hej"));
        assert_eq!(localized.name(Some("da-dk")), "Lokaliseret");
    }

    #[test]
    fn stats_report_every_store() {
        let (_, service) = service();
        let stats = service.stats();
        assert_eq!(stats.stores.len(), 3);
        assert_eq!(stats.stores[0].nodes, 8);
        assert_eq!(stats.domains, 2);
        assert_eq!(stats.pending_events, 0);
    }
}
