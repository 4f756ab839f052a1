//! Content-model types shared by every cache layer.

pub mod content_type;
pub mod error;
pub mod slug;
pub mod value;
pub mod variant;

pub use nucache_records::{ContentVariation, ItemKind, PropertyCacheLevel, ValueType};
