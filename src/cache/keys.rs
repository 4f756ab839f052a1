//! Cache key definitions.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Identifies one property's converted values in a scoped cache.
///
/// The preview flag is part of the key so preview and live values never
/// collide in a cache shared by both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyCacheKey {
    pub preview: bool,
    pub content_key: Uuid,
    pub alias: Arc<str>,
}

impl PropertyCacheKey {
    pub fn new(preview: bool, content_key: Uuid, alias: Arc<str>) -> Self {
        Self {
            preview,
            content_key,
            alias,
        }
    }
}

impl fmt::Display for PropertyCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.preview { 'P' } else { 'L' };
        write!(f, "property[{mode}]:{}:{}", self.content_key, self.alias)
    }
}
