//! Bidirectional route cache.
//!
//! Tracks `content id ↔ route` per preview flag so route lookups and url
//! building skip the tree walk. The forward side is a bounded LRU; whatever
//! it evicts is removed from the reverse side too.
//!
//! Every invalidation advances an epoch. Readers take a [`RouteStamp`]
//! before deciding a route is cacheable and store with it, so a route
//! computed before an invalidation is never written back after it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use metrics::counter;
use tracing::trace;

use super::config::CacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::routes";
const METRIC_ROUTE_CACHE_HIT: &str = "nucache_route_cache_hit_total";
const METRIC_ROUTE_CACHE_MISS: &str = "nucache_route_cache_miss_total";

struct RouteIndex {
    by_id: LruCache<i32, String>,
    by_route: HashMap<String, i32>,
}

impl RouteIndex {
    fn new(config: &CacheConfig) -> Self {
        Self {
            by_id: LruCache::new(config.route_cache_limit_non_zero()),
            by_route: HashMap::new(),
        }
    }

    fn store(&mut self, id: i32, route: &str) {
        if let Some(previous) = self.by_id.pop(&id) {
            self.by_route.remove(&previous);
        }
        if let Some(owner) = self.by_route.remove(route) {
            self.by_id.pop(&owner);
        }
        if let Some((evicted_id, evicted_route)) = self.by_id.push(id, route.to_string())
            && evicted_id != id
        {
            trace!(evicted_id, route = %evicted_route, "Route evicted");
            self.by_route.remove(&evicted_route);
        }
        self.by_route.insert(route.to_string(), id);
    }

    fn remove_id(&mut self, id: i32) {
        if let Some(route) = self.by_id.pop(&id) {
            self.by_route.remove(&route);
        }
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_route.clear();
    }
}

/// Invalidation epoch observed by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteStamp(u64);

/// Route cache shared by every snapshot.
pub struct RouteCache {
    live: Mutex<RouteIndex>,
    preview: Mutex<RouteIndex>,
    epoch: AtomicU64,
}

impl RouteCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            live: Mutex::new(RouteIndex::new(config)),
            preview: Mutex::new(RouteIndex::new(config)),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn stamp(&self) -> RouteStamp {
        RouteStamp(self.epoch.load(Ordering::SeqCst))
    }

    fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn index(&self, preview: bool) -> &Mutex<RouteIndex> {
        if preview { &self.preview } else { &self.live }
    }

    pub fn route(&self, id: i32, preview: bool) -> Option<String> {
        let found = mutex_lock(self.index(preview), SOURCE, "route")
            .by_id
            .get(&id)
            .cloned();
        record_lookup(found.is_some(), "route");
        found
    }

    pub fn id_by_route(&self, route: &str, preview: bool) -> Option<i32> {
        let mut index = mutex_lock(self.index(preview), SOURCE, "id_by_route");
        let found = index.by_route.get(route).copied();
        if let Some(id) = found {
            // keep the forward entry warm
            index.by_id.promote(&id);
        }
        drop(index);
        record_lookup(found.is_some(), "id");
        found
    }

    /// Store a route; an id keeps at most one route per preview flag.
    pub fn store(&self, id: i32, route: &str, preview: bool) {
        mutex_lock(self.index(preview), SOURCE, "store").store(id, route);
    }

    /// Store a route unless the cache was invalidated after `stamp` was taken.
    ///
    /// Returns whether the route was stored.
    pub fn store_stamped(&self, stamp: RouteStamp, id: i32, route: &str, preview: bool) -> bool {
        let mut index = mutex_lock(self.index(preview), SOURCE, "store_stamped");
        if self.stamp() != stamp {
            trace!(id, route, "Stale route dropped");
            return false;
        }
        index.store(id, route);
        true
    }

    /// Forget the routes of `id` under both preview flags.
    pub fn clear_routes_for_content(&self, id: i32) {
        self.invalidate();
        mutex_lock(&self.live, SOURCE, "clear_routes_for_content.live").remove_id(id);
        mutex_lock(&self.preview, SOURCE, "clear_routes_for_content.preview").remove_id(id);
    }

    pub fn clear(&self) {
        self.invalidate();
        mutex_lock(&self.live, SOURCE, "clear.live").clear();
        mutex_lock(&self.preview, SOURCE, "clear.preview").clear();
    }

    pub fn len(&self, preview: bool) -> usize {
        mutex_lock(self.index(preview), SOURCE, "len").by_id.len()
    }
}

fn record_lookup(hit: bool, by: &'static str) {
    if hit {
        counter!(METRIC_ROUTE_CACHE_HIT, "by" => by).increment(1);
    } else {
        counter!(METRIC_ROUTE_CACHE_MISS, "by" => by).increment(1);
    }
}
