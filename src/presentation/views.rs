//! Serializable views over snapshot reads, printed by the CLI.

use std::collections::BTreeMap;

use nucache_records::ItemKind;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    content::PublishedContent,
    domain::{error::CacheError, value::PropertyValue, variant::VariantKey},
    snapshot::{CacheStats, PublishedSnapshot},
};

#[derive(Debug, Clone, Serialize)]
pub struct ContentView {
    pub id: i32,
    pub key: Uuid,
    pub kind: ItemKind,
    pub content_type: String,
    pub name: String,
    pub parent_id: i32,
    pub level: i32,
    pub path: String,
    pub sort_order: i32,
    pub published: bool,
    pub preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub update_date: OffsetDateTime,
    pub children: Vec<i32>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ContentView {
    /// Read `content` through `snapshot`, converting every property for `culture`.
    ///
    /// Culture-invariant properties ignore `culture`.
    pub fn build(
        snapshot: &PublishedSnapshot,
        content: &PublishedContent,
        culture: Option<&str>,
    ) -> Result<Self, CacheError> {
        let cache = snapshot.cache(content.kind());
        let scope = snapshot.value_scope();

        let mut properties = BTreeMap::new();
        for property in content.properties() {
            let variant = match culture {
                Some(culture) if property.property_type().variations().varies_by_culture() => {
                    VariantKey::culture(culture)
                }
                _ => VariantKey::invariant(),
            };
            let value = property.value(&scope, &variant)?;
            properties.insert(property.alias().to_string(), value.as_ref().clone());
        }

        let route = match content.kind() {
            ItemKind::Content => cache.get_route_by_id(content.id()),
            ItemKind::Media | ItemKind::Member => None,
        };

        Ok(Self {
            id: content.id(),
            key: content.key(),
            kind: content.kind(),
            content_type: content.content_type().alias().to_string(),
            name: content.name(culture).to_string(),
            parent_id: content.parent_id(),
            level: content.level(),
            path: content.path().to_string(),
            sort_order: content.sort_order(),
            published: content.is_published(),
            preview: content.is_preview(),
            url_segment: content.url_segment(culture),
            route,
            update_date: content.update_date(),
            children: cache
                .children_of(content.id())
                .iter()
                .map(|child| child.id())
                .collect(),
            properties,
        })
    }
}

/// One node of a printed tree.
#[derive(Debug, Clone, Serialize)]
pub struct TreeView {
    pub id: i32,
    pub name: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeView>,
}

impl TreeView {
    /// Every root of `kind` with its visible descendants.
    pub fn roots(snapshot: &PublishedSnapshot, kind: ItemKind) -> Vec<Self> {
        let cache = snapshot.cache(kind);
        cache
            .get_at_root()
            .iter()
            .map(|root| Self::node(snapshot, kind, root))
            .collect()
    }

    fn node(snapshot: &PublishedSnapshot, kind: ItemKind, content: &PublishedContent) -> Self {
        let children = snapshot
            .cache(kind)
            .children_of(content.id())
            .iter()
            .map(|child| Self::node(snapshot, kind, child))
            .collect();
        Self {
            id: content.id(),
            name: content.name(None).to_string(),
            content_type: content.content_type().alias().to_string(),
            children,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteView {
    pub route: String,
    pub content: ContentView,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    #[serde(flatten)]
    pub stats: CacheStats,
}

impl From<CacheStats> for StatsView {
    fn from(stats: CacheStats) -> Self {
        Self { stats }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::cache::config::CacheConfig;
    use crate::domain::value::ConverterRegistry;
    use crate::infra::memory::MemorySource;
    use crate::infra::memory::tests::site_seed;
    use crate::snapshot::PublishedSnapshotService;

    use super::*;

    fn service() -> PublishedSnapshotService {
        let source = Arc::new(MemorySource::new(site_seed()));
        let service = PublishedSnapshotService::new(
            CacheConfig::default(),
            source.clone(),
            source,
            ConverterRegistry::new(),
        );
        service.load_all().expect("load");
        service
    }

    #[test]
    fn content_view_converts_properties_for_a_culture() {
        let service = service();
        let snapshot = service.create_snapshot(false);
        let content = snapshot.content().get_by_id(1180).expect("localized");

        let view = ContentView::build(&snapshot, &content, Some("da-DK")).expect("view");

        assert_eq!(view.name, "Lokaliseret");
        assert_eq!(view.content_type, "localizedPage");
        assert_eq!(view.route.as_deref(), Some("1172/localized"));
        assert_eq!(
            view.properties.get("title"),
            Some(&PropertyValue::Text("Hej".to_string()))
        );
    }

    #[test]
    fn tree_view_nests_children_in_sort_order() {
        let service = service();
        let snapshot = service.create_snapshot(false);

        let roots = TreeView::roots(&snapshot, ItemKind::Content);
        let ids: Vec<i32> = roots.iter().map(|root| root.id).collect();
        assert_eq!(ids, vec![1046, 1172]);

        let sub1 = &roots[0].children[0];
        assert_eq!(sub1.id, 1173);
        let grandchildren: Vec<i32> = sub1.children.iter().map(|child| child.id).collect();
        assert_eq!(grandchildren, vec![1174, 1176]);
    }
}
