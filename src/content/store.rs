//! Generation-indexed content store.
//!
//! The current generation lives behind an [`ArcSwap`]: readers load it
//! without locking, publishers serialize on a writer mutex and swap in the
//! next generation. Older generations stay alive for as long as a snapshot
//! holds them and are reclaimed when the last `Arc` drops.

use std::sync::{Arc, Mutex, Weak};

use arc_swap::ArcSwap;
use metrics::gauge;
use nucache_records::{ContentNodeKit, ItemKind};
use tracing::{info, instrument};

use crate::cache::content_types::ContentTypeLookup;
use crate::cache::lock::mutex_lock;
use crate::domain::error::CacheError;

use super::generation::{ChangeSet, Generation};
use super::published::PublishedContent;

const SOURCE: &str = "content::store";
const METRIC_GENERATIONS_ALIVE: &str = "nucache_generations_alive";

/// Copy-on-write store for one item kind.
pub struct ContentStore {
    kind: ItemKind,
    current: ArcSwap<Generation>,
    writer: Mutex<()>,
    published: Mutex<Vec<Weak<Generation>>>,
}

impl ContentStore {
    pub fn new(kind: ItemKind) -> Self {
        let initial = Arc::new(Generation::empty(kind));
        Self {
            kind,
            published: Mutex::new(vec![Arc::downgrade(&initial)]),
            current: ArcSwap::new(initial),
            writer: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// The current generation, held for as long as the caller keeps it.
    pub fn create_snapshot(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().number()
    }

    pub fn is_current(&self, generation: &Generation) -> bool {
        self.current.load().number() == generation.number()
    }

    pub fn get(&self, id: i32, preview: bool) -> Option<Arc<PublishedContent>> {
        self.current.load().get(id, preview)
    }

    /// Publish a new generation built from `changes`.
    ///
    /// On error the current generation is left as it was.
    #[instrument(skip_all, fields(kind = %self.kind, upserts = changes.upserts.len(), removals = changes.removals.len()))]
    pub fn apply_changes(
        &self,
        changes: ChangeSet,
        types: &dyn ContentTypeLookup,
    ) -> Result<Arc<Generation>, CacheError> {
        let _writer = mutex_lock(&self.writer, SOURCE, "apply_changes");
        let previous = self.current.load_full();
        let next = Arc::new(previous.next(changes, types)?);
        self.publish(Arc::clone(&next));
        Ok(next)
    }

    /// Replace everything with a generation built from `kits`.
    #[instrument(skip_all, fields(kind = %self.kind, kits = kits.len()))]
    pub fn bulk_load(
        &self,
        kits: Vec<ContentNodeKit>,
        types: &dyn ContentTypeLookup,
    ) -> Result<Arc<Generation>, CacheError> {
        let _writer = mutex_lock(&self.writer, SOURCE, "bulk_load");
        let number = self.current.load().number() + 1;
        let next = Arc::new(Generation::rebuild(self.kind, number, kits, types)?);
        info!(
            kind = %self.kind,
            generation = number,
            nodes = next.len(),
            "Content store loaded"
        );
        self.publish(Arc::clone(&next));
        Ok(next)
    }

    /// Generations still referenced by the store or any reader.
    pub fn live_generations(&self) -> usize {
        let mut published = mutex_lock(&self.published, SOURCE, "live_generations");
        published.retain(|generation| generation.strong_count() > 0);
        published.len()
    }

    fn publish(&self, next: Arc<Generation>) {
        let alive = {
            let mut published = mutex_lock(&self.published, SOURCE, "publish");
            published.retain(|generation| generation.strong_count() > 0);
            published.push(Arc::downgrade(&next));
            published.len()
        };
        self.current.store(next);
        gauge!(METRIC_GENERATIONS_ALIVE, "kind" => self.kind.as_str()).set(alive as f64);
    }
}
