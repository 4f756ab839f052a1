//! Change consumer for executing change plans.
//!
//! Drains events from the queue, reloads what they name from the content
//! source, and publishes one new generation per affected store. One
//! consumption runs at a time, from drain to route invalidation.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::histogram;
use nucache_records::{ItemKind, ROOT_PARENT_ID};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::application::repos::ContentSource;
use crate::content::{ChangeSet, ContentStores, Generation};
use crate::domain::error::CacheError;
use crate::snapshot::domains::DomainStore;

use super::config::CacheConfig;
use super::content_types::PublishedContentTypeCache;
use super::events::{EventQueue, RefreshScope};
use super::lock::mutex_lock;
use super::planner::{ChangePlan, NodeAction};
use super::routes::RouteCache;

const SOURCE: &str = "cache::consumer";
const METRIC_CONSUME_MS: &str = "nucache_consume_ms";

/// Processes cache events and keeps stores, types and routes consistent.
///
/// The consumer:
/// 1. Drains events from the queue
/// 2. Merges them into a change plan
/// 3. Evicts content types, reloads nodes, publishes generations, clears routes
pub struct ChangeConsumer {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    stores: ContentStores,
    domains: Arc<DomainStore>,
    types: Arc<PublishedContentTypeCache>,
    routes: Arc<RouteCache>,
    source: Arc<dyn ContentSource>,
    pipeline: Mutex<()>,
}

/// What one store needs after a plan is applied to it.
#[derive(Default)]
struct StoreOutcome {
    route_ids: BTreeSet<i32>,
    clear_all_routes: bool,
}

impl ChangeConsumer {
    pub fn new(
        config: CacheConfig,
        queue: Arc<EventQueue>,
        stores: ContentStores,
        domains: Arc<DomainStore>,
        types: Arc<PublishedContentTypeCache>,
        routes: Arc<RouteCache>,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            config,
            queue,
            stores,
            domains,
            types,
            routes,
            source,
            pipeline: Mutex::new(()),
        }
    }

    /// Consume one batch of pending events and execute its plan.
    ///
    /// Returns true if any events were processed. On error the failing store
    /// keeps its current generation; stores already updated stay updated.
    pub fn consume(&self) -> Result<bool, CacheError> {
        let _pipeline = mutex_lock(&self.pipeline, SOURCE, "consume");
        self.consume_batch()
    }

    /// Consume batches until the queue is empty.
    ///
    /// Returns true if any events were processed. Stops at the first error.
    pub fn consume_all(&self) -> Result<bool, CacheError> {
        let _pipeline = mutex_lock(&self.pipeline, SOURCE, "consume_all");
        let mut processed = false;
        while self.consume_batch()? {
            processed = true;
        }
        Ok(processed)
    }

    /// Rebuild every store, the domain list and the type cache from the source.
    pub fn rebuild(&self) -> Result<(), CacheError> {
        let _pipeline = mutex_lock(&self.pipeline, SOURCE, "rebuild");
        self.rebuild_all()
    }

    #[instrument(skip(self))]
    fn consume_batch(&self) -> Result<bool, CacheError> {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit_non_zero());
        if events.is_empty() {
            return Ok(false);
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = ChangePlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        let mode = if plan.refresh_all {
            self.rebuild_all()?;
            "rebuild"
        } else {
            self.execute(&plan)?;
            "incremental"
        };

        info!(event_count, mode, "Cache consumption complete");
        histogram!(METRIC_CONSUME_MS, "mode" => mode)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(true)
    }

    #[instrument(skip(self))]
    fn rebuild_all(&self) -> Result<(), CacheError> {
        self.types.clear_all();
        for kind in ItemKind::ALL {
            let kits = self
                .source
                .load_all(kind)
                .map_err(|err| CacheError::source(kind, "all nodes", err))?;
            self.stores.get(kind).bulk_load(kits, self.types.as_ref())?;
        }
        self.reload_domains()?;
        self.routes.clear();
        Ok(())
    }

    fn execute(&self, plan: &ChangePlan) -> Result<(), CacheError> {
        // Phase 1: evict types so reloaded nodes bind to fresh definitions
        let reload_types = self.invalidate_types(plan);

        // Phase 2: one change set per store
        let mut clear_all_routes = !reload_types.is_empty() || plan.domains;
        let mut route_ids = BTreeSet::new();
        for kind in ItemKind::ALL {
            let outcome = self.apply_to_store(kind, plan, &reload_types)?;
            clear_all_routes |= outcome.clear_all_routes;
            route_ids.extend(outcome.route_ids);
        }

        if plan.domains {
            self.reload_domains()?;
        }

        // Phase 3: routes
        if clear_all_routes {
            self.routes.clear();
            debug!("Route cache cleared");
        } else {
            for id in &route_ids {
                self.routes.clear_routes_for_content(*id);
            }
            debug!(cleared = route_ids.len(), "Routes cleared for content");
        }
        Ok(())
    }

    /// Evict changed types. Returns the ids whose nodes must be reloaded.
    fn invalidate_types(&self, plan: &ChangePlan) -> BTreeSet<i32> {
        let mut reload = plan.content_types.clone();
        for id in &plan.content_types {
            self.types.clear_content_type(*id);
        }
        for data_type_id in &plan.data_types {
            reload.extend(self.types.clear_data_type(*data_type_id));
            // types evicted earlier are no longer cached but still bound to nodes
            for kind in ItemKind::ALL {
                reload.extend(
                    self.stores
                        .get(kind)
                        .create_snapshot()
                        .content_type_ids_referencing(*data_type_id),
                );
            }
        }
        if !reload.is_empty() {
            info!(content_types = ?reload, "Content types invalidated");
        }
        reload
    }

    fn apply_to_store(
        &self,
        kind: ItemKind,
        plan: &ChangePlan,
        reload_types: &BTreeSet<i32>,
    ) -> Result<StoreOutcome, CacheError> {
        let store = self.stores.get(kind);
        let current = store.create_snapshot();
        let mut changes = ChangeSet::default();
        let mut outcome = StoreOutcome::default();

        if !reload_types.is_empty() {
            let ids: Vec<i32> = reload_types.iter().copied().collect();
            let kits = self
                .source
                .load_by_content_types(kind, &ids)
                .map_err(|err| CacheError::source(kind, format!("content types {ids:?}"), err))?;
            changes.upserts.extend(kits);
        }

        for (id, action) in plan.nodes_of(kind) {
            if kind == ItemKind::Content {
                outcome.route_ids.extend(current.subtree_ids(id));
            }
            match action {
                NodeAction::Remove => changes.removals.push(id),
                NodeAction::Refresh(RefreshScope::Node) => {
                    match self
                        .source
                        .load_node(kind, id)
                        .map_err(|err| CacheError::source(kind, format!("node {id}"), err))?
                    {
                        Some(kit) => changes.upserts.push(kit),
                        None => changes.removals.push(id),
                    }
                }
                NodeAction::Refresh(RefreshScope::Branch) => {
                    let kits = self
                        .source
                        .load_branch(kind, id)
                        .map_err(|err| CacheError::source(kind, format!("branch {id}"), err))?;
                    if kits.is_empty() {
                        changes.removals.push(id);
                        continue;
                    }
                    let loaded: HashSet<i32> = kits.iter().map(|kit| kit.node.id).collect();
                    changes.removals.extend(
                        current
                            .subtree_ids(id)
                            .into_iter()
                            .filter(|existing| !loaded.contains(existing)),
                    );
                    changes.upserts.extend(kits);
                }
            }
        }

        if changes.is_empty() {
            return Ok(outcome);
        }

        if kind == ItemKind::Content {
            outcome.clear_all_routes = touches_top_level(&current, &changes);
        }
        let next = store.apply_changes(changes, self.types.as_ref())?;
        if kind == ItemKind::Content {
            let refreshed: Vec<i32> = plan.nodes_of(kind).map(|(id, _)| id).collect();
            for id in refreshed {
                outcome.route_ids.extend(next.subtree_ids(id));
            }
        }
        Ok(outcome)
    }

    fn reload_domains(&self) -> Result<(), CacheError> {
        let domains = self
            .source
            .load_domains()
            .map_err(|err| CacheError::source(ItemKind::Content, "domains", err))?;
        self.domains.replace(domains);
        Ok(())
    }
}

/// New nodes and top-level nodes can change which node a route resolves to,
/// not only their own route.
fn touches_top_level(current: &Generation, changes: &ChangeSet) -> bool {
    let upserted = changes.upserts.iter().any(|kit| {
        kit.node.parent_id == ROOT_PARENT_ID || current.node(kit.node.id).is_none()
    });
    let removed = changes.removals.iter().any(|id| {
        current
            .node(*id)
            .is_some_and(|node| node.parent_id() == ROOT_PARENT_ID)
    });
    upserted || removed
}
