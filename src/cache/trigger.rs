//! Cache trigger service.
//!
//! The write-side entry points: each publishes an event and drains the
//! queue immediately, so the change is visible to the next snapshot.

use std::sync::Arc;

use nucache_records::ItemKind;
use tracing::debug;

use crate::domain::error::CacheError;

use super::consumer::ChangeConsumer;
use super::events::{EventKind, EventQueue, RefreshScope};

/// Publishes change notifications into the cache.
///
/// # Usage
///
/// ```ignore
/// // After a document is saved and published:
/// trigger.apply_changes(&[1046], ItemKind::Content)?;
/// ```
pub struct CacheTrigger {
    queue: Arc<EventQueue>,
    consumer: Arc<ChangeConsumer>,
}

impl CacheTrigger {
    pub fn new(queue: Arc<EventQueue>, consumer: Arc<ChangeConsumer>) -> Self {
        Self { queue, consumer }
    }

    /// Publish an event and optionally consume immediately.
    pub fn trigger(&self, kind: EventKind, consume_now: bool) -> Result<(), CacheError> {
        self.queue.publish(kind);
        if consume_now {
            self.consumer.consume_all()?;
        } else {
            debug!(pending = self.queue.len(), "Cache event deferred");
        }
        Ok(())
    }

    /// Reload the given nodes from the content source.
    ///
    /// Nodes the source no longer returns are removed.
    pub fn apply_changes(&self, ids: &[i32], kind: ItemKind) -> Result<(), CacheError> {
        for id in ids {
            self.queue
                .publish(EventKind::refreshed(kind, *id, RefreshScope::Node));
        }
        self.consumer.consume_all()?;
        Ok(())
    }

    /// Reload a node and everything below it (moves, sort changes, unpublishing
    /// a parent).
    pub fn invalidate(&self, kind: ItemKind, id: i32) -> Result<(), CacheError> {
        self.trigger(EventKind::refreshed(kind, id, RefreshScope::Branch), true)
    }

    pub fn remove(&self, kind: ItemKind, id: i32) -> Result<(), CacheError> {
        self.trigger(EventKind::removed(kind, id), true)
    }

    pub fn clear_content_type(&self, id: i32) -> Result<(), CacheError> {
        self.trigger(EventKind::ContentTypeChanged { id }, true)
    }

    pub fn clear_data_type(&self, id: i32) -> Result<(), CacheError> {
        self.trigger(EventKind::DataTypeChanged { id }, true)
    }

    pub fn domains_changed(&self) -> Result<(), CacheError> {
        self.trigger(EventKind::DomainsChanged, true)
    }

    /// Rebuild everything from the source.
    pub fn refresh_all(&self) -> Result<(), CacheError> {
        self.trigger(EventKind::RefreshAll, true)
    }

    /// Consume whatever is pending. Returns whether anything was processed.
    pub fn flush(&self) -> Result<bool, CacheError> {
        self.consumer.consume_all()
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}
