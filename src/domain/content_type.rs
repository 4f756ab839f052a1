//! Immutable published content-type metadata.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nucache_records::{
    ContentTypeRecord, ContentVariation, ItemKind, PropertyCacheLevel, PropertyTypeRecord,
    ValueType,
};

use super::error::CacheError;
use super::value::{BuiltinConverter, ConverterRegistry, PropertyValueConverter};

/// One property definition, bound to the converter that handles its values.
pub struct PublishedPropertyType {
    alias: String,
    data_type_id: i32,
    editor_alias: String,
    value_type: ValueType,
    variations: ContentVariation,
    cache_level: PropertyCacheLevel,
    converter: Arc<dyn PropertyValueConverter>,
}

impl PublishedPropertyType {
    pub fn new(record: &PropertyTypeRecord, converter: Arc<dyn PropertyValueConverter>) -> Self {
        let cache_level = record
            .cache_level
            .unwrap_or_else(|| converter.cache_level());
        Self {
            alias: record.alias.clone(),
            data_type_id: record.data_type_id,
            editor_alias: record.editor_alias.clone(),
            value_type: record.value_type,
            variations: record.variations,
            cache_level,
            converter,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn data_type_id(&self) -> i32 {
        self.data_type_id
    }

    pub fn editor_alias(&self) -> &str {
        &self.editor_alias
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn variations(&self) -> ContentVariation {
        self.variations
    }

    pub fn cache_level(&self) -> PropertyCacheLevel {
        self.cache_level
    }

    pub fn converter(&self) -> &dyn PropertyValueConverter {
        self.converter.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(alias: &str, value_type: ValueType) -> Self {
        let record = PropertyTypeRecord {
            alias: alias.to_string(),
            data_type_id: 0,
            editor_alias: String::new(),
            value_type,
            variations: ContentVariation::Nothing,
            cache_level: None,
        };
        Self::new(&record, Arc::new(BuiltinConverter::new(value_type)))
    }
}

impl fmt::Debug for PublishedPropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishedPropertyType")
            .field("alias", &self.alias)
            .field("data_type_id", &self.data_type_id)
            .field("value_type", &self.value_type)
            .field("variations", &self.variations)
            .field("cache_level", &self.cache_level)
            .finish_non_exhaustive()
    }
}

/// Metadata for one content, media or member type.
///
/// The property list already contains every composed property, so a type
/// never needs to consult its compositions at read time.
#[derive(Debug)]
pub struct PublishedContentType {
    id: i32,
    alias: String,
    kind: ItemKind,
    variations: ContentVariation,
    compositions: Vec<String>,
    property_types: Vec<Arc<PublishedPropertyType>>,
    index: HashMap<String, usize>,
}

impl PublishedContentType {
    /// Build a content type, rejecting variation combinations the cache cannot represent.
    pub fn new(
        id: i32,
        alias: impl Into<String>,
        kind: ItemKind,
        variations: ContentVariation,
        compositions: Vec<String>,
        property_types: Vec<PublishedPropertyType>,
    ) -> Result<Self, CacheError> {
        let alias = alias.into();

        if kind == ItemKind::Member && !variations.is_invariant() {
            return Err(CacheError::unsupported_variation(format!(
                "member type `{alias}` cannot vary"
            )));
        }

        let mut index = HashMap::with_capacity(property_types.len());
        for (position, property_type) in property_types.iter().enumerate() {
            if property_type.variations.varies_by_culture() && !variations.varies_by_culture() {
                return Err(CacheError::unsupported_variation(format!(
                    "property `{}` varies by culture but type `{alias}` is invariant",
                    property_type.alias
                )));
            }
            if kind == ItemKind::Member && !property_type.variations.is_invariant() {
                return Err(CacheError::unsupported_variation(format!(
                    "member property `{}` cannot vary",
                    property_type.alias
                )));
            }
            index.insert(property_type.alias.to_ascii_lowercase(), position);
        }

        Ok(Self {
            id,
            alias,
            kind,
            variations,
            compositions,
            property_types: property_types.into_iter().map(Arc::new).collect(),
            index,
        })
    }

    /// Build from a stored record, binding each property to a converter.
    pub fn from_record(
        record: &ContentTypeRecord,
        converters: &ConverterRegistry,
    ) -> Result<Self, CacheError> {
        let property_types = record
            .property_types
            .iter()
            .map(|property| PublishedPropertyType::new(property, converters.resolve(property)))
            .collect();
        Self::new(
            record.id,
            record.alias.clone(),
            record.kind,
            record.variations,
            record.compositions.clone(),
            property_types,
        )
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn variations(&self) -> ContentVariation {
        self.variations
    }

    pub fn compositions(&self) -> &[String] {
        &self.compositions
    }

    pub fn property_types(&self) -> &[Arc<PublishedPropertyType>] {
        &self.property_types
    }

    /// Case-insensitive property type lookup.
    pub fn property_type(&self, alias: &str) -> Option<&Arc<PublishedPropertyType>> {
        self.index
            .get(&alias.to_ascii_lowercase())
            .map(|position| &self.property_types[*position])
    }

    pub fn references_data_type(&self, data_type_id: i32) -> bool {
        self.property_types
            .iter()
            .any(|property_type| property_type.data_type_id == data_type_id)
    }
}
