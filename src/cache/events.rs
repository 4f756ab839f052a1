//! Cache event system.
//!
//! Write-side notifications become epoch-stamped events in an in-memory
//! queue; the consumer drains them in batches.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use nucache_records::ItemKind;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_EVENT_QUEUE_LEN: &str = "nucache_event_queue_len";

/// Monotonic epoch for ordering events.
///
/// When several events target the same node, the one with the highest
/// epoch decides what happens to it.
pub type Epoch = u64;

/// Cache event with idempotency and ordering support.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    /// Monotonic epoch for ordering within this process.
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// How much of the tree a refresh reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshScope {
    /// The node alone.
    Node,
    /// The node and all of its descendants.
    Branch,
}

/// Changes reported by the content-change collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A document was saved, published, unpublished or moved.
    ContentRefreshed { id: i32, scope: RefreshScope },
    ContentRemoved { id: i32 },
    MediaRefreshed { id: i32, scope: RefreshScope },
    MediaRemoved { id: i32 },
    MemberRefreshed { id: i32 },
    MemberRemoved { id: i32 },
    /// A content, media or member type was edited.
    ContentTypeChanged { id: i32 },
    /// A data type was edited; every type using it is stale.
    DataTypeChanged { id: i32 },
    DomainsChanged,
    /// Rebuild every store from the source.
    RefreshAll,
}

impl EventKind {
    pub fn refreshed(kind: ItemKind, id: i32, scope: RefreshScope) -> Self {
        match kind {
            ItemKind::Content => Self::ContentRefreshed { id, scope },
            ItemKind::Media => Self::MediaRefreshed { id, scope },
            ItemKind::Member => Self::MemberRefreshed { id },
        }
    }

    pub fn removed(kind: ItemKind, id: i32) -> Self {
        match kind {
            ItemKind::Content => Self::ContentRemoved { id },
            ItemKind::Media => Self::MediaRemoved { id },
            ItemKind::Member => Self::MemberRemoved { id },
        }
    }

    /// The node this event is about, if any.
    pub fn target(&self) -> Option<(ItemKind, i32)> {
        match *self {
            Self::ContentRefreshed { id, .. } | Self::ContentRemoved { id } => {
                Some((ItemKind::Content, id))
            }
            Self::MediaRefreshed { id, .. } | Self::MediaRemoved { id } => {
                Some((ItemKind::Media, id))
            }
            Self::MemberRefreshed { id } | Self::MemberRemoved { id } => {
                Some((ItemKind::Member, id))
            }
            _ => None,
        }
    }
}

/// In-memory event queue.
///
/// A plain mutex is enough: publishers and the consumer hold it only to
/// push or drain.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, kind: EventKind) {
        let epoch = self.next_epoch();
        let event = CacheEvent::new(kind, epoch);

        debug!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "Cache event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained = queue.drain(..count).collect();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn event_creation() {
        let kind = EventKind::DomainsChanged;
        let event = CacheEvent::new(kind.clone(), 42);

        assert_eq!(event.epoch, 42);
        assert_eq!(event.kind, kind);
        assert!(!event.id.is_nil());
    }

    #[test]
    fn epoch_monotonicity() {
        let queue = EventQueue::new();
        let e1 = queue.next_epoch();
        let e2 = queue.next_epoch();
        assert!(e1 < e2);
    }

    #[test]
    fn publish_and_drain_fifo() {
        let queue = EventQueue::new();
        queue.publish(EventKind::ContentRemoved { id: 1 });
        queue.publish(EventKind::DomainsChanged);
        queue.publish(EventKind::RefreshAll);

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(events[0].kind, EventKind::ContentRemoved { id: 1 });
        assert_eq!(events[1].kind, EventKind::DomainsChanged);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn kind_constructors_follow_item_kind() {
        assert_eq!(
            EventKind::refreshed(ItemKind::Member, 9, RefreshScope::Branch),
            EventKind::MemberRefreshed { id: 9 }
        );
        assert_eq!(
            EventKind::removed(ItemKind::Media, 3).target(),
            Some((ItemKind::Media, 3))
        );
        assert_eq!(EventKind::RefreshAll.target(), None);
    }

    #[test]
    fn event_queue_recovers_from_poisoned_lock() {
        let queue = EventQueue::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = queue.queue.lock().expect("queue lock should be acquired");
            panic!("poison queue lock");
        }));

        queue.publish(EventKind::DomainsChanged);
        assert_eq!(queue.len(), 1);
    }
}
