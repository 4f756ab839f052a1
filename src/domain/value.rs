//! Converted property values and the converters that produce them.
//!
//! A property's raw source value (as stored) goes through two stages:
//! source → intermediate, then intermediate → object (for code) or
//! intermediate → xpath (for legacy XML queries). Converters are keyed by
//! property editor alias, falling back to the built-in converter for the
//! property's declared [`ValueType`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nucache_records::{PropertyCacheLevel, PropertyTypeRecord, ValueType};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use super::content_type::PublishedPropertyType;

const UDI_DOCUMENT_PREFIX: &str = "umb://document/";
const UDI_MEDIA_PREFIX: &str = "umb://media/";

/// A converted property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    None,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    Structured(Value),
    ContentRef(Uuid),
    ContentRefs(Vec<Uuid>),
}

impl PropertyValue {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Decimal(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_content_refs(&self) -> &[Uuid] {
        match self {
            Self::ContentRef(key) => std::slice::from_ref(key),
            Self::ContentRefs(keys) => keys,
            _ => &[],
        }
    }

    /// Render the value the way XML-based queries expect it.
    pub fn to_xpath_string(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Text(text) => Some(text.clone()),
            Self::Integer(value) => Some(value.to_string()),
            Self::Decimal(value) => Some(value.to_string()),
            Self::Boolean(value) => Some(if *value { "1" } else { "0" }.to_string()),
            Self::DateTime(value) => value.format(&Rfc3339).ok(),
            Self::Structured(value) => Some(value.to_string()),
            Self::ContentRef(key) => Some(key.to_string()),
            Self::ContentRefs(keys) => Some(
                keys.iter()
                    .map(Uuid::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}

/// The default "has value" rule: non-null, and non-blank when a string.
pub fn source_has_value(source: &Value) -> bool {
    match source {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}

/// Converts raw source values into [`PropertyValue`]s.
///
/// Implementations must be pure: the cache decides how often each stage
/// runs, based on [`cache_level`](PropertyValueConverter::cache_level).
pub trait PropertyValueConverter: Send + Sync {
    /// Scope in which converted values may be memoized.
    fn cache_level(&self) -> PropertyCacheLevel {
        PropertyCacheLevel::Element
    }

    fn is_value(&self, source: &Value) -> bool {
        source_has_value(source)
    }

    fn source_to_intermediate(
        &self,
        property_type: &PublishedPropertyType,
        source: &Value,
        preview: bool,
    ) -> PropertyValue;

    fn intermediate_to_object(
        &self,
        _property_type: &PublishedPropertyType,
        _level: PropertyCacheLevel,
        intermediate: &PropertyValue,
        _preview: bool,
    ) -> PropertyValue {
        intermediate.clone()
    }

    fn intermediate_to_xpath(
        &self,
        _property_type: &PublishedPropertyType,
        intermediate: &PropertyValue,
        _preview: bool,
    ) -> PropertyValue {
        intermediate
            .to_xpath_string()
            .map_or(PropertyValue::None, PropertyValue::Text)
    }
}

/// Built-in converter for one declared [`ValueType`].
#[derive(Debug, Clone, Copy)]
pub struct BuiltinConverter {
    value_type: ValueType,
}

impl BuiltinConverter {
    pub fn new(value_type: ValueType) -> Self {
        Self { value_type }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
}

impl PropertyValueConverter for BuiltinConverter {
    fn cache_level(&self) -> PropertyCacheLevel {
        match self.value_type {
            // pickers resolve other nodes, so they follow the generation
            ValueType::ContentPicker => PropertyCacheLevel::Elements,
            ValueType::MultiContentPicker => PropertyCacheLevel::Snapshot,
            _ => PropertyCacheLevel::Element,
        }
    }

    fn is_value(&self, source: &Value) -> bool {
        match (self.value_type, source) {
            (ValueType::MultiContentPicker, Value::Array(items)) => !items.is_empty(),
            _ => source_has_value(source),
        }
    }

    fn source_to_intermediate(
        &self,
        _property_type: &PublishedPropertyType,
        source: &Value,
        _preview: bool,
    ) -> PropertyValue {
        match self.value_type {
            ValueType::Text => convert_text(source),
            ValueType::Integer => convert_integer(source),
            ValueType::Decimal => convert_decimal(source),
            ValueType::Boolean => PropertyValue::Boolean(convert_boolean(source)),
            ValueType::DateTime => convert_date_time(source),
            ValueType::Json => match source {
                Value::Null => PropertyValue::None,
                Value::String(text) => serde_json::from_str(text)
                    .map_or_else(|_| PropertyValue::Text(text.clone()), PropertyValue::Structured),
                other => PropertyValue::Structured(other.clone()),
            },
            ValueType::ContentPicker => parse_content_ref(source)
                .map_or(PropertyValue::None, PropertyValue::ContentRef),
            ValueType::MultiContentPicker => {
                let keys = parse_content_refs(source);
                if keys.is_empty() {
                    PropertyValue::None
                } else {
                    PropertyValue::ContentRefs(keys)
                }
            }
        }
    }
}

fn convert_text(source: &Value) -> PropertyValue {
    match source {
        Value::Null => PropertyValue::None,
        Value::String(text) => PropertyValue::Text(text.clone()),
        Value::Bool(value) => PropertyValue::Text(value.to_string()),
        Value::Number(number) => PropertyValue::Text(number.to_string()),
        other => PropertyValue::Text(other.to_string()),
    }
}

fn convert_integer(source: &Value) -> PropertyValue {
    match source {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64))
            .map_or(PropertyValue::None, PropertyValue::Integer),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_or(PropertyValue::None, PropertyValue::Integer),
        Value::Bool(value) => PropertyValue::Integer(i64::from(*value)),
        _ => PropertyValue::None,
    }
}

fn convert_decimal(source: &Value) -> PropertyValue {
    match source {
        Value::Number(number) => number
            .as_f64()
            .map_or(PropertyValue::None, PropertyValue::Decimal),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_or(PropertyValue::None, PropertyValue::Decimal),
        _ => PropertyValue::None,
    }
}

fn convert_boolean(source: &Value) -> bool {
    match source {
        Value::Bool(value) => *value,
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        Value::String(text) => {
            let text = text.trim();
            text == "1" || text.eq_ignore_ascii_case("true")
        }
        _ => false,
    }
}

fn convert_date_time(source: &Value) -> PropertyValue {
    match source {
        Value::String(text) => OffsetDateTime::parse(text.trim(), &Rfc3339)
            .map_or(PropertyValue::None, PropertyValue::DateTime),
        _ => PropertyValue::None,
    }
}

fn parse_content_ref(source: &Value) -> Option<Uuid> {
    match source {
        Value::String(text) => parse_udi(text),
        _ => None,
    }
}

fn parse_content_refs(source: &Value) -> Vec<Uuid> {
    match source {
        Value::String(text) => text.split(',').filter_map(parse_udi).collect(),
        Value::Array(items) => items.iter().filter_map(parse_content_ref).collect(),
        _ => Vec::new(),
    }
}

/// Accepts a bare GUID or a `umb://document/…` / `umb://media/…` identifier.
fn parse_udi(text: &str) -> Option<Uuid> {
    let text = text.trim();
    let raw = text
        .strip_prefix(UDI_DOCUMENT_PREFIX)
        .or_else(|| text.strip_prefix(UDI_MEDIA_PREFIX))
        .unwrap_or(text);
    Uuid::parse_str(raw).ok()
}

/// Converters by property editor alias, with built-in fallbacks per value type.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    by_editor: HashMap<String, Arc<dyn PropertyValueConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter for a property editor alias; replaces any previous one.
    pub fn register(
        &mut self,
        editor_alias: impl Into<String>,
        converter: Arc<dyn PropertyValueConverter>,
    ) {
        self.by_editor
            .insert(editor_alias.into().to_ascii_lowercase(), converter);
    }

    pub fn resolve(&self, record: &PropertyTypeRecord) -> Arc<dyn PropertyValueConverter> {
        self.by_editor
            .get(&record.editor_alias.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| Arc::new(BuiltinConverter::new(record.value_type)))
    }

    pub fn len(&self) -> usize {
        self.by_editor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_editor.is_empty()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("editors", &self.by_editor.keys().collect::<Vec<_>>())
            .finish()
    }
}
