//! Published snapshots: the read side of the cache.

pub mod content_cache;
pub mod domains;
pub mod handle;
pub mod service;

pub use content_cache::ContentCache;
pub use domains::{DomainCache, DomainStore};
pub use handle::{ForcedPreview, PublishedSnapshot};
pub use service::{CacheStats, PublishedSnapshotService, StoreStats};
