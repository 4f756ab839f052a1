//! Persisted record types for the NuCache snapshot cache.
//!
//! These are the shapes the cache ingests from its durable collaborators:
//! content type metadata, content node kits (structure plus published and
//! draft data), domains, and the seed file used for bulk loading.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Parent id used for top-level nodes.
pub const ROOT_PARENT_ID: i32 = -1;

/// The kind of item a content type describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Content,
    Media,
    Member,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::Content, ItemKind::Media, ItemKind::Member];

    /// Parse a kind name, ignoring ASCII case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "content" => Some(Self::Content),
            "media" => Some(Self::Media),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Media => "media",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a content type or property type varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentVariation {
    #[default]
    Nothing,
    Culture,
    Segment,
    CultureAndSegment,
}

impl ContentVariation {
    pub fn varies_by_culture(&self) -> bool {
        matches!(self, Self::Culture | Self::CultureAndSegment)
    }

    pub fn varies_by_segment(&self) -> bool {
        matches!(self, Self::Segment | Self::CultureAndSegment)
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, Self::Nothing)
    }
}

/// Declared value type of a property; selects the built-in converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Text,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    Json,
    ContentPicker,
    MultiContentPicker,
}

/// Scope of memoization for converted property values, by increasing duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCacheLevel {
    None,
    Element,
    Elements,
    Snapshot,
}

/// Content type metadata as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeRecord {
    pub id: i32,
    pub alias: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub variations: ContentVariation,
    #[serde(default)]
    pub compositions: Vec<String>,
    #[serde(default)]
    pub property_types: Vec<PropertyTypeRecord>,
}

/// One property definition of a content type, including composed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyTypeRecord {
    pub alias: String,
    pub data_type_id: i32,
    #[serde(default)]
    pub editor_alias: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub variations: ContentVariation,
    /// Pins the cache level instead of letting the converter decide.
    #[serde(default)]
    pub cache_level: Option<PropertyCacheLevel>,
}

/// Structural part of a content item: identity and tree position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNodeRecord {
    pub id: i32,
    pub key: Uuid,
    #[serde(default = "root_parent_id")]
    pub parent_id: i32,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sort_order: i32,
    pub content_type_id: i32,
    #[serde(default = "epoch", with = "time::serde::rfc3339")]
    pub create_date: OffsetDateTime,
    #[serde(default)]
    pub creator_id: i32,
}

/// One published or draft version of a content item's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDataRecord {
    pub name: String,
    #[serde(default)]
    pub url_segment: Option<String>,
    #[serde(default)]
    pub version_id: i32,
    #[serde(default)]
    pub template_id: Option<i32>,
    #[serde(default)]
    pub published: bool,
    #[serde(default = "epoch", with = "time::serde::rfc3339")]
    pub update_date: OffsetDateTime,
    #[serde(default)]
    pub writer_id: i32,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<PropertyDataRecord>>,
    #[serde(default)]
    pub culture_infos: BTreeMap<String, CultureVariationRecord>,
}

/// A stored property value for one `(culture, segment)` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDataRecord {
    #[serde(default)]
    pub culture: String,
    #[serde(default)]
    pub segment: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl PropertyDataRecord {
    pub fn invariant(value: serde_json::Value) -> Self {
        Self {
            culture: String::new(),
            segment: String::new(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CultureVariationRecord {
    pub name: String,
    #[serde(default)]
    pub url_segment: Option<String>,
    #[serde(default = "epoch", with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(default)]
    pub is_draft: bool,
}

/// Everything the cache needs to materialize one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNodeKit {
    pub node: ContentNodeRecord,
    #[serde(default)]
    pub published: Option<ContentDataRecord>,
    #[serde(default)]
    pub draft: Option<ContentDataRecord>,
}

impl ContentNodeKit {
    /// A kit with neither published nor draft data carries nothing to cache.
    pub fn is_empty(&self) -> bool {
        self.published.is_none() && self.draft.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: i32,
    pub name: String,
    pub root_content_id: i32,
    #[serde(default)]
    pub culture: Option<String>,
    #[serde(default)]
    pub is_wildcard: bool,
}

/// Bulk-load input: every record kind the cache can be rebuilt from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub content_types: Vec<ContentTypeRecord>,
    pub content: Vec<ContentNodeKit>,
    pub media: Vec<ContentNodeKit>,
    pub members: Vec<ContentNodeKit>,
    pub domains: Vec<DomainRecord>,
}

fn root_parent_id() -> i32 {
    ROOT_PARENT_ID
}

fn epoch() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}
