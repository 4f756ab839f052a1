//! Published content nodes.
//!
//! One concrete node type serves content, media and members: the content
//! type reference says what it is, and properties live in a bag ordered like
//! the type's property list.

use std::collections::BTreeMap;
use std::sync::Arc;

use nucache_records::{ContentDataRecord, ContentNodeRecord, CultureVariationRecord, ItemKind};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::content_type::PublishedContentType;
use crate::domain::error::CacheError;
use crate::domain::slug::resolve_url_segment;
use crate::domain::value::PropertyValue;
use crate::domain::variant::VariantKey;

use super::property::{Property, ValueScope};

/// Identity and tree position of a node, shared by its live and draft versions.
#[derive(Debug)]
pub struct ContentNode {
    id: i32,
    key: Uuid,
    kind: ItemKind,
    content_type: Arc<PublishedContentType>,
    parent_id: i32,
    level: i32,
    path: String,
    sort_order: i32,
    create_date: OffsetDateTime,
    creator_id: i32,
}

impl ContentNode {
    pub fn new(record: &ContentNodeRecord, content_type: Arc<PublishedContentType>) -> Self {
        Self {
            id: record.id,
            key: record.key,
            kind: content_type.kind(),
            content_type,
            parent_id: record.parent_id,
            level: record.level,
            path: record.path.clone(),
            sort_order: record.sort_order,
            create_date: record.create_date,
            creator_id: record.creator_id,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn content_type(&self) -> &Arc<PublishedContentType> {
        &self.content_type
    }

    pub fn parent_id(&self) -> i32 {
        self.parent_id
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    pub fn create_date(&self) -> OffsetDateTime {
        self.create_date
    }

    pub fn creator_id(&self) -> i32 {
        self.creator_id
    }
}

#[derive(Debug, Clone)]
struct ContentData {
    name: String,
    url_segment: Option<String>,
    version_id: i32,
    template_id: Option<i32>,
    published: bool,
    update_date: OffsetDateTime,
    writer_id: i32,
    cultures: BTreeMap<String, CultureVariationRecord>,
}

impl From<&ContentDataRecord> for ContentData {
    fn from(record: &ContentDataRecord) -> Self {
        Self {
            name: record.name.clone(),
            url_segment: record.url_segment.clone(),
            version_id: record.version_id,
            template_id: record.template_id,
            published: record.published,
            update_date: record.update_date,
            writer_id: record.writer_id,
            cultures: record
                .culture_infos
                .iter()
                .map(|(culture, info)| (culture.trim().to_ascii_lowercase(), info.clone()))
                .collect(),
        }
    }
}

/// One version (live or draft) of a content item.
///
/// Immutable once built; an edit produces a new value in a new generation.
#[derive(Debug)]
pub struct PublishedContent {
    node: Arc<ContentNode>,
    data: Arc<ContentData>,
    properties: Vec<Property>,
    is_preview: bool,
}

impl PublishedContent {
    pub fn new(node: Arc<ContentNode>, data: &ContentDataRecord, is_preview: bool) -> Self {
        let properties = node
            .content_type
            .property_types()
            .iter()
            .map(|property_type| {
                let values = data
                    .properties
                    .get(property_type.alias())
                    .or_else(|| {
                        data.properties
                            .iter()
                            .find(|(alias, _)| alias.eq_ignore_ascii_case(property_type.alias()))
                            .map(|(_, values)| values)
                    })
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                Property::new(
                    Arc::clone(property_type),
                    node.key,
                    node.kind,
                    is_preview,
                    values,
                )
            })
            .collect();

        Self {
            node,
            data: Arc::new(ContentData::from(data)),
            properties,
            is_preview,
        }
    }

    /// A previewing copy of a live node that has no draft.
    pub fn create_preview_clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            data: Arc::clone(&self.data),
            properties: self
                .properties
                .iter()
                .map(Property::clone_for_preview)
                .collect(),
            is_preview: true,
        }
    }

    pub fn node(&self) -> &Arc<ContentNode> {
        &self.node
    }

    pub fn id(&self) -> i32 {
        self.node.id
    }

    pub fn key(&self) -> Uuid {
        self.node.key
    }

    pub fn kind(&self) -> ItemKind {
        self.node.kind
    }

    pub fn content_type(&self) -> &Arc<PublishedContentType> {
        &self.node.content_type
    }

    pub fn parent_id(&self) -> i32 {
        self.node.parent_id
    }

    pub fn level(&self) -> i32 {
        self.node.level
    }

    pub fn path(&self) -> &str {
        &self.node.path
    }

    pub fn sort_order(&self) -> i32 {
        self.node.sort_order
    }

    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    pub fn is_published(&self) -> bool {
        self.data.published
    }

    pub fn version_id(&self) -> i32 {
        self.data.version_id
    }

    pub fn template_id(&self) -> Option<i32> {
        self.data.template_id
    }

    pub fn update_date(&self) -> OffsetDateTime {
        self.data.update_date
    }

    pub fn writer_id(&self) -> i32 {
        self.data.writer_id
    }

    /// Cultures this version carries names for.
    pub fn cultures(&self) -> impl Iterator<Item = &str> {
        self.data.cultures.keys().map(String::as_str)
    }

    /// Name for `culture`, falling back to the invariant name.
    pub fn name(&self, culture: Option<&str>) -> &str {
        match self.culture_info(culture) {
            Some(info) => &info.name,
            None => &self.data.name,
        }
    }

    /// Url segment for `culture`; derived from the name when none is stored.
    pub fn url_segment(&self, culture: Option<&str>) -> Option<String> {
        match self.culture_info(culture) {
            Some(info) => resolve_url_segment(info.url_segment.as_deref(), &info.name),
            None => resolve_url_segment(self.data.url_segment.as_deref(), &self.data.name),
        }
    }

    fn culture_info(&self, culture: Option<&str>) -> Option<&CultureVariationRecord> {
        let culture = culture?.trim().to_ascii_lowercase();
        self.data.cultures.get(&culture)
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, alias: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|property| property.alias().eq_ignore_ascii_case(alias))
    }

    /// False for unknown aliases as well as empty values.
    pub fn has_value(&self, alias: &str, variant: &VariantKey) -> Result<bool, CacheError> {
        match self.property(alias) {
            Some(property) => property.has_value(variant),
            None => Ok(false),
        }
    }

    /// Converted value of a property the content type declares.
    pub fn value(
        &self,
        scope: &ValueScope<'_>,
        alias: &str,
        variant: &VariantKey,
    ) -> Result<Arc<PropertyValue>, CacheError> {
        let property = self.property(alias).ok_or_else(|| CacheError::UnknownProperty {
            content_type: self.content_type().alias().to_string(),
            alias: alias.to_string(),
        })?;
        property.value(scope, variant)
    }
}
