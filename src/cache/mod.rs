//! NuCache caching layers.
//!
//! Everything below the stores that decides what is memoized, for how long,
//! and when it is thrown away:
//!
//! - **Type cache**: published content types by alias and id
//! - **Value caches**: memo primitives plus the `Elements`/`Snapshot` scoped caches
//! - **Route cache**: bidirectional `id ↔ route` per preview flag
//! - **Event pipeline**: queue, change plan, consumer and trigger
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `nucache.toml`:
//!
//! ```toml
//! [cache]
//! route_cache_limit = 10000
//! hide_top_level_node = true
//! full_cache_when_previewing = false
//! # ... see config.rs for all options
//! ```

pub mod config;
pub mod consumer;
pub mod content_types;
pub mod events;
pub mod keys;
pub(crate) mod lock;
pub mod planner;
pub mod routes;
pub mod scoped;
pub mod trigger;
pub mod value;

pub use config::{CacheConfig, ElementsCachePolicy, ElementsCacheTarget};
pub use consumer::ChangeConsumer;
pub use content_types::{ContentTypeLookup, PublishedContentTypeCache};
pub use events::{CacheEvent, Epoch, EventKind, EventQueue, RefreshScope};
pub use keys::PropertyCacheKey;
pub use planner::{ChangePlan, NodeAction};
pub use routes::{RouteCache, RouteStamp};
pub use scoped::ScopedCache;
pub use trigger::CacheTrigger;
