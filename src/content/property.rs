//! Lazily converted property values.
//!
//! A [`Property`] owns the raw source values of one property on one content
//! item, keyed by variant. Conversions run on demand and are memoized at
//! the scope the property type's cache level asks for:
//!
//! | level      | intermediate      | object / xpath                      |
//! |------------|-------------------|-------------------------------------|
//! | `None`     | recomputed        | recomputed                          |
//! | `Element`  | on the property   | on the property                     |
//! | `Elements` | on the property   | elements cache (see policy)         |
//! | `Snapshot` | on the property   | snapshot cache                      |
//!
//! Lock order is the property lock, then a scoped cache entry lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use nucache_records::{ItemKind, PropertyCacheLevel, PropertyDataRecord};
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

use crate::cache::config::{ElementsCachePolicy, ElementsCacheTarget};
use crate::cache::keys::PropertyCacheKey;
use crate::cache::lock::mutex_lock;
use crate::cache::scoped::ScopedCache;
use crate::cache::value::{CacheValues, Stage};
use crate::domain::content_type::PublishedPropertyType;
use crate::domain::error::CacheError;
use crate::domain::value::PropertyValue;
use crate::domain::variant::VariantKey;

const SOURCE: &str = "content::property";

/// The caches a read may memoize into, plus the routing policy for `Elements`.
///
/// Borrowed from a snapshot for the duration of one read; nothing here may be
/// retained past it.
pub struct ValueScope<'a> {
    snapshot_cache: &'a ScopedCache,
    elements_cache: &'a ScopedCache,
    previewing: bool,
    policy: ElementsCachePolicy,
}

impl<'a> ValueScope<'a> {
    pub fn new(
        snapshot_cache: &'a ScopedCache,
        elements_cache: &'a ScopedCache,
        previewing: bool,
        policy: ElementsCachePolicy,
    ) -> Self {
        Self {
            snapshot_cache,
            elements_cache,
            previewing,
            policy,
        }
    }

    pub fn previewing(&self) -> bool {
        self.previewing
    }

    fn cache_for(&self, level: PropertyCacheLevel, is_member: bool) -> &'a ScopedCache {
        match level {
            PropertyCacheLevel::Elements => match self.policy.target(self.previewing, is_member) {
                ElementsCacheTarget::Shared => self.elements_cache,
                ElementsCacheTarget::Snapshot => self.snapshot_cache,
            },
            _ => self.snapshot_cache,
        }
    }
}

#[derive(Default)]
struct PropertyMemo {
    intermediate: HashMap<VariantKey, Arc<PropertyValue>>,
    element: CacheValues,
}

/// Runtime value holder for one property on one content item.
pub struct Property {
    property_type: Arc<PublishedPropertyType>,
    content_key: Uuid,
    kind: ItemKind,
    is_preview: bool,
    alias: Arc<str>,
    sources: HashMap<VariantKey, Value>,
    memo: Mutex<PropertyMemo>,
}

impl Property {
    pub fn new(
        property_type: Arc<PublishedPropertyType>,
        content_key: Uuid,
        kind: ItemKind,
        is_preview: bool,
        data: &[PropertyDataRecord],
    ) -> Self {
        let sources = data
            .iter()
            .map(|record| {
                (
                    VariantKey::new(&record.culture, record.segment.clone()),
                    record.value.clone(),
                )
            })
            .collect();
        Self::with_sources(property_type, content_key, kind, is_preview, sources)
    }

    fn with_sources(
        property_type: Arc<PublishedPropertyType>,
        content_key: Uuid,
        kind: ItemKind,
        is_preview: bool,
        sources: HashMap<VariantKey, Value>,
    ) -> Self {
        let alias = Arc::from(property_type.alias());
        Self {
            property_type,
            content_key,
            kind,
            is_preview,
            alias,
            sources,
            memo: Mutex::new(PropertyMemo::default()),
        }
    }

    /// Same source values, no memoized conversions, preview flag set.
    pub fn clone_for_preview(&self) -> Self {
        Self::with_sources(
            Arc::clone(&self.property_type),
            self.content_key,
            self.kind,
            true,
            self.sources.clone(),
        )
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn property_type(&self) -> &Arc<PublishedPropertyType> {
        &self.property_type
    }

    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    pub fn variants(&self) -> impl Iterator<Item = &VariantKey> {
        self.sources.keys()
    }

    pub fn source_value(&self, variant: &VariantKey) -> Result<Option<&Value>, CacheError> {
        self.validate(variant)?;
        Ok(self.sources.get(variant))
    }

    pub fn has_value(&self, variant: &VariantKey) -> Result<bool, CacheError> {
        Ok(self
            .source_value(variant)?
            .is_some_and(|source| self.property_type.converter().is_value(source)))
    }

    pub fn value(
        &self,
        scope: &ValueScope<'_>,
        variant: &VariantKey,
    ) -> Result<Arc<PropertyValue>, CacheError> {
        self.validate(variant)?;
        Ok(self.converted(scope, variant, Stage::Object))
    }

    pub fn xpath_value(
        &self,
        scope: &ValueScope<'_>,
        variant: &VariantKey,
    ) -> Result<Arc<PropertyValue>, CacheError> {
        self.validate(variant)?;
        Ok(self.converted(scope, variant, Stage::XPath))
    }

    fn validate(&self, variant: &VariantKey) -> Result<(), CacheError> {
        let variations = self.property_type.variations();
        if !variant.culture_code().is_empty() && !variations.varies_by_culture() {
            return Err(CacheError::invalid_variant(
                self.alias(),
                "culture",
                variant.culture_code(),
            ));
        }
        if !variant.segment().is_empty() && !variations.varies_by_segment() {
            return Err(CacheError::invalid_variant(
                self.alias(),
                "segment",
                variant.segment(),
            ));
        }
        Ok(())
    }

    fn converted(&self, scope: &ValueScope<'_>, variant: &VariantKey, stage: Stage) -> Arc<PropertyValue> {
        let level = self.property_type.cache_level();
        let mut memo = mutex_lock(&self.memo, SOURCE, "converted");

        if level == PropertyCacheLevel::None {
            let intermediate = self.to_intermediate(variant);
            return Arc::new(self.from_intermediate(stage, level, &intermediate));
        }

        let intermediate = Arc::clone(
            memo.intermediate
                .entry(variant.clone())
                .or_insert_with(|| Arc::new(self.to_intermediate(variant))),
        );
        let compute = || self.from_intermediate(stage, level, &intermediate);

        match level {
            PropertyCacheLevel::Element => memo
                .element
                .for_variant(variant)
                .stage(stage)
                .get_or_compute(compute),
            _ => {
                let cache = scope.cache_for(level, self.kind == ItemKind::Member);
                let key = PropertyCacheKey::new(self.is_preview, self.content_key, Arc::clone(&self.alias));
                let entry = cache.values(&key);
                let mut values = mutex_lock(&entry, SOURCE, "converted.scoped");
                values.for_variant(variant).stage(stage).get_or_compute(compute)
            }
        }
    }

    fn to_intermediate(&self, variant: &VariantKey) -> PropertyValue {
        trace!(alias = %self.alias, %variant, "Converting source value");
        let source = self.sources.get(variant).unwrap_or(&Value::Null);
        self.property_type
            .converter()
            .source_to_intermediate(&self.property_type, source, self.is_preview)
    }

    fn from_intermediate(
        &self,
        stage: Stage,
        level: PropertyCacheLevel,
        intermediate: &PropertyValue,
    ) -> PropertyValue {
        let converter = self.property_type.converter();
        match stage {
            Stage::Object => converter.intermediate_to_object(
                &self.property_type,
                level,
                intermediate,
                self.is_preview,
            ),
            Stage::XPath => {
                converter.intermediate_to_xpath(&self.property_type, intermediate, self.is_preview)
            }
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("alias", &self.alias)
            .field("content_key", &self.content_key)
            .field("is_preview", &self.is_preview)
            .field("variants", &self.sources.len())
            .finish_non_exhaustive()
    }
}
