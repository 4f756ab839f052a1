//! Published content-type cache.
//!
//! Types are indexed by `(kind, alias)` and `(kind, id)` behind a single
//! reader-writer lock. Misses resolve through the [`ContentTypeSource`]
//! outside the lock; two racing readers may both build the same type, and
//! the first one stored wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use metrics::counter;
use nucache_records::ItemKind;
use tracing::{debug, info};

use crate::application::repos::ContentTypeSource;
use crate::domain::content_type::PublishedContentType;
use crate::domain::error::{CacheError, TypeKey};
use crate::domain::value::ConverterRegistry;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::content_types";
const METRIC_TYPE_CACHE_HIT: &str = "nucache_type_cache_hit_total";
const METRIC_TYPE_CACHE_MISS: &str = "nucache_type_cache_miss_total";

/// Resolves published content types for the content stores.
pub trait ContentTypeLookup: Send + Sync {
    fn content_type(
        &self,
        kind: ItemKind,
        alias: &str,
    ) -> Result<Arc<PublishedContentType>, CacheError>;

    fn content_type_by_id(
        &self,
        kind: ItemKind,
        id: i32,
    ) -> Result<Arc<PublishedContentType>, CacheError>;
}

pub type AliasResolver =
    Arc<dyn Fn(ItemKind, &str) -> Option<Arc<PublishedContentType>> + Send + Sync>;
pub type IdResolver = Arc<dyn Fn(ItemKind, i32) -> Option<Arc<PublishedContentType>> + Send + Sync>;

#[derive(Default)]
struct TypeIndex {
    by_alias: HashMap<(ItemKind, String), Arc<PublishedContentType>>,
    by_id: HashMap<(ItemKind, i32), Arc<PublishedContentType>>,
}

impl TypeIndex {
    fn insert(&mut self, content_type: Arc<PublishedContentType>) -> Arc<PublishedContentType> {
        let kind = content_type.kind();
        let stored = Arc::clone(
            self.by_id
                .entry((kind, content_type.id()))
                .or_insert(content_type),
        );
        self.by_alias
            .entry((kind, stored.alias().to_ascii_lowercase()))
            .or_insert_with(|| Arc::clone(&stored));
        stored
    }

    fn retain(&mut self, keep: impl Fn(&PublishedContentType) -> bool) -> Vec<i32> {
        let mut evicted = Vec::new();
        self.by_id.retain(|_, content_type| {
            let kept = keep(content_type);
            if !kept {
                evicted.push(content_type.id());
            }
            kept
        });
        self.by_alias
            .retain(|_, content_type| keep(content_type));
        evicted.sort_unstable();
        evicted
    }

    fn clear(&mut self) {
        self.by_alias.clear();
        self.by_id.clear();
    }
}

/// Thread-safe cache of [`PublishedContentType`]s.
pub struct PublishedContentTypeCache {
    index: RwLock<TypeIndex>,
    source: Arc<dyn ContentTypeSource>,
    converters: ConverterRegistry,
    alias_resolver: RwLock<Option<AliasResolver>>,
    id_resolver: RwLock<Option<IdResolver>>,
}

impl PublishedContentTypeCache {
    pub fn new(source: Arc<dyn ContentTypeSource>, converters: ConverterRegistry) -> Self {
        Self {
            index: RwLock::new(TypeIndex::default()),
            source,
            converters,
            alias_resolver: RwLock::new(None),
            id_resolver: RwLock::new(None),
        }
    }

    pub fn get(&self, kind: ItemKind, alias: &str) -> Result<Arc<PublishedContentType>, CacheError> {
        let key = (kind, alias.to_ascii_lowercase());
        if let Some(found) = rw_read(&self.index, SOURCE, "get").by_alias.get(&key) {
            counter!(METRIC_TYPE_CACHE_HIT, "kind" => kind.as_str()).increment(1);
            return Ok(Arc::clone(found));
        }
        counter!(METRIC_TYPE_CACHE_MISS, "kind" => kind.as_str()).increment(1);

        let resolved = self.resolve_alias(kind, alias)?;
        Ok(rw_write(&self.index, SOURCE, "get.populate").insert(resolved))
    }

    pub fn get_by_id(&self, kind: ItemKind, id: i32) -> Result<Arc<PublishedContentType>, CacheError> {
        if let Some(found) = rw_read(&self.index, SOURCE, "get_by_id")
            .by_id
            .get(&(kind, id))
        {
            counter!(METRIC_TYPE_CACHE_HIT, "kind" => kind.as_str()).increment(1);
            return Ok(Arc::clone(found));
        }
        counter!(METRIC_TYPE_CACHE_MISS, "kind" => kind.as_str()).increment(1);

        let resolved = self.resolve_id(kind, id)?;
        Ok(rw_write(&self.index, SOURCE, "get_by_id.populate").insert(resolved))
    }

    /// Evict one content type. Returns whether anything was cached for it.
    pub fn clear_content_type(&self, id: i32) -> bool {
        let evicted = rw_write(&self.index, SOURCE, "clear_content_type")
            .retain(|content_type| content_type.id() != id);
        debug!(content_type_id = id, evicted = evicted.len(), "Content type evicted");
        !evicted.is_empty()
    }

    /// Evict every type with a property backed by `data_type_id`.
    ///
    /// Property lists already include composed properties, so no walk over
    /// compositions is needed. Returns the evicted type ids.
    pub fn clear_data_type(&self, data_type_id: i32) -> Vec<i32> {
        let evicted = rw_write(&self.index, SOURCE, "clear_data_type")
            .retain(|content_type| !content_type.references_data_type(data_type_id));
        debug!(data_type_id, evicted = ?evicted, "Content types evicted for data type");
        evicted
    }

    pub fn clear_all(&self) {
        rw_write(&self.index, SOURCE, "clear_all").clear();
        info!("Content type cache cleared");
    }

    /// Replace alias resolution. Clears the whole cache.
    pub fn override_alias_resolver(&self, resolver: AliasResolver) {
        *rw_write(&self.alias_resolver, SOURCE, "override_alias_resolver") = Some(resolver);
        self.clear_all();
    }

    /// Replace id resolution. Clears the whole cache.
    pub fn override_id_resolver(&self, resolver: IdResolver) {
        *rw_write(&self.id_resolver, SOURCE, "override_id_resolver") = Some(resolver);
        self.clear_all();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.index, SOURCE, "len").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve_alias(&self, kind: ItemKind, alias: &str) -> Result<Arc<PublishedContentType>, CacheError> {
        let resolver = rw_read(&self.alias_resolver, SOURCE, "resolve_alias").clone();
        let resolved = match resolver {
            Some(resolver) => resolver(kind, alias),
            None => self
                .source
                .content_type_by_alias(kind, alias)
                .map_err(|err| CacheError::source(kind, TypeKey::Alias(alias.to_string()), err))?
                .map(|record| PublishedContentType::from_record(&record, &self.converters))
                .transpose()?
                .map(Arc::new),
        };
        resolved
            .ok_or_else(|| CacheError::content_type_not_found(kind, TypeKey::Alias(alias.to_string())))
    }

    fn resolve_id(&self, kind: ItemKind, id: i32) -> Result<Arc<PublishedContentType>, CacheError> {
        let resolver = rw_read(&self.id_resolver, SOURCE, "resolve_id").clone();
        let resolved = match resolver {
            Some(resolver) => resolver(kind, id),
            None => self
                .source
                .content_type_by_id(kind, id)
                .map_err(|err| CacheError::source(kind, TypeKey::Id(id), err))?
                .map(|record| PublishedContentType::from_record(&record, &self.converters))
                .transpose()?
                .map(Arc::new),
        };
        resolved.ok_or_else(|| CacheError::content_type_not_found(kind, TypeKey::Id(id)))
    }
}

impl ContentTypeLookup for PublishedContentTypeCache {
    fn content_type(
        &self,
        kind: ItemKind,
        alias: &str,
    ) -> Result<Arc<PublishedContentType>, CacheError> {
        self.get(kind, alias)
    }

    fn content_type_by_id(
        &self,
        kind: ItemKind,
        id: i32,
    ) -> Result<Arc<PublishedContentType>, CacheError> {
        self.get_by_id(kind, id)
    }
}

impl fmt::Debug for PublishedContentTypeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishedContentTypeCache")
            .field("cached", &self.len())
            .finish_non_exhaustive()
    }
}
