use std::fmt;

use nucache_records::ItemKind;
use thiserror::Error;

/// Identifies the content type a lookup was made for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Alias(String),
    Id(i32),
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(alias) => write!(f, "alias `{alias}`"),
            Self::Id(id) => write!(f, "id {id}"),
        }
    }
}

/// Failure reported by a collaborator (content or content-type source).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SourceError {
    message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fatal errors raised by the cache core.
///
/// Lookup misses are never errors; they surface as `None`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{kind} content type with {key} not found")]
    ContentTypeNotFound { kind: ItemKind, key: TypeKey },
    #[error("unknown item kind `{0}`")]
    InvalidItemKind(String),
    #[error("property `{alias}` does not vary by {axis}, got `{value}`")]
    InvalidVariant {
        alias: String,
        axis: &'static str,
        value: String,
    },
    #[error("content type `{content_type}` has no property `{alias}`")]
    UnknownProperty { content_type: String, alias: String },
    #[error("unsupported variation: {message}")]
    UnsupportedVariation { message: String },
    #[error("{kind} node {id} references missing parent {parent_id}")]
    OrphanNode {
        kind: ItemKind,
        id: i32,
        parent_id: i32,
    },
    #[error("{kind} source failed for {key}: {source}")]
    Source {
        kind: ItemKind,
        key: String,
        #[source]
        source: SourceError,
    },
}

impl CacheError {
    pub fn content_type_not_found(kind: ItemKind, key: TypeKey) -> Self {
        Self::ContentTypeNotFound { kind, key }
    }

    pub fn invalid_variant(
        alias: impl Into<String>,
        axis: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidVariant {
            alias: alias.into(),
            axis,
            value: value.into(),
        }
    }

    pub fn unsupported_variation(message: impl Into<String>) -> Self {
        Self::UnsupportedVariation {
            message: message.into(),
        }
    }

    pub fn source(kind: ItemKind, key: impl fmt::Display, source: SourceError) -> Self {
        Self::Source {
            kind,
            key: key.to_string(),
            source,
        }
    }
}

/// Parse an item kind name, failing loudly on anything unknown.
pub fn parse_item_kind(value: &str) -> Result<ItemKind, CacheError> {
    ItemKind::parse(value).ok_or_else(|| CacheError::InvalidItemKind(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_item_kind_is_rejected() {
        let err = parse_item_kind("document").expect_err("unknown kind");
        assert!(matches!(err, CacheError::InvalidItemKind(ref kind) if kind == "document"));
        assert_eq!(parse_item_kind("Media").expect("media"), ItemKind::Media);
    }

    #[test]
    fn not_found_message_carries_context() {
        let err = CacheError::content_type_not_found(
            ItemKind::Content,
            TypeKey::Alias("home".to_string()),
        );
        assert_eq!(err.to_string(), "content content type with alias `home` not found");
    }
}
