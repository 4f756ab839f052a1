//! Collaborator traits describing the cache's durable sources.

use nucache_records::{ContentNodeKit, ContentTypeRecord, DomainRecord, ItemKind};

use crate::domain::error::SourceError;

/// Resolves content-type metadata on cache misses.
///
/// `Ok(None)` means the type does not exist; the cache turns that into a
/// fatal lookup error.
pub trait ContentTypeSource: Send + Sync {
    fn content_type_by_alias(
        &self,
        kind: ItemKind,
        alias: &str,
    ) -> Result<Option<ContentTypeRecord>, SourceError>;

    fn content_type_by_id(
        &self,
        kind: ItemKind,
        id: i32,
    ) -> Result<Option<ContentTypeRecord>, SourceError>;
}

/// Supplies node kits to rebuild or refresh the content stores.
pub trait ContentSource: Send + Sync {
    /// One node, or `None` when it no longer exists.
    fn load_node(&self, kind: ItemKind, id: i32) -> Result<Option<ContentNodeKit>, SourceError>;

    /// A node and all of its descendants, parents before children.
    fn load_branch(&self, kind: ItemKind, id: i32) -> Result<Vec<ContentNodeKit>, SourceError>;

    /// Every node of a kind, parents before children.
    fn load_all(&self, kind: ItemKind) -> Result<Vec<ContentNodeKit>, SourceError>;

    /// Every node whose content type is one of `content_type_ids`.
    fn load_by_content_types(
        &self,
        kind: ItemKind,
        content_type_ids: &[i32],
    ) -> Result<Vec<ContentNodeKit>, SourceError>;

    fn load_domains(&self) -> Result<Vec<DomainRecord>, SourceError>;
}
