//! Per-kind read API of a snapshot.
//!
//! A [`ContentCache`] resolves everything against the generation its snapshot
//! is bound to. Lookups that find nothing return `None`; nothing here fails.

use std::sync::Arc;

use nucache_records::{ItemKind, ROOT_PARENT_ID};
use tracing::trace;
use uuid::Uuid;

use crate::content::{ContentStore, Generation, PublishedContent};

use super::handle::PublishedSnapshot;

/// Content, media or member view of one snapshot.
pub struct ContentCache<'a> {
    snapshot: &'a PublishedSnapshot,
    store: &'a ContentStore,
    generation: &'a Generation,
    allow_preview: bool,
}

impl<'a> ContentCache<'a> {
    pub(crate) fn new(
        snapshot: &'a PublishedSnapshot,
        store: &'a ContentStore,
        generation: &'a Generation,
        allow_preview: bool,
    ) -> Self {
        Self {
            snapshot,
            store,
            generation,
            allow_preview,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.generation.kind()
    }

    /// Generation number this view reads from.
    pub fn generation(&self) -> u64 {
        self.generation.number()
    }

    /// Effective preview flag, including any forced override.
    pub fn is_previewing(&self) -> bool {
        self.allow_preview && self.snapshot.is_previewing()
    }

    pub fn get_by_id(&self, id: i32) -> Option<Arc<PublishedContent>> {
        self.generation.get(id, self.is_previewing())
    }

    pub fn get_by_key(&self, key: Uuid) -> Option<Arc<PublishedContent>> {
        self.generation.get_by_key(key, self.is_previewing())
    }

    pub fn has_by_id(&self, id: i32) -> bool {
        self.generation.contains(id, self.is_previewing())
    }

    /// Top-level items in sort order.
    pub fn get_at_root(&self) -> Vec<Arc<PublishedContent>> {
        self.generation.at_root(self.is_previewing())
    }

    pub fn has_content(&self) -> bool {
        !self.get_at_root().is_empty()
    }

    pub fn children_of(&self, id: i32) -> Vec<Arc<PublishedContent>> {
        self.generation.children(id, self.is_previewing())
    }

    pub fn parent_of(&self, content: &PublishedContent) -> Option<Arc<PublishedContent>> {
        match content.parent_id() {
            ROOT_PARENT_ID => None,
            parent_id => self.get_by_id(parent_id),
        }
    }

    /// Resolve a route such as `/about/team` or `1172/contact`.
    ///
    /// A leading number selects the domain root the rest of the path starts
    /// from. Malformed routes are simply not found.
    pub fn get_by_route(&self, route: &str) -> Option<Arc<PublishedContent>> {
        let preview = self.is_previewing();
        let stamp = self.snapshot.routes().stamp();
        let cacheable = self.routes_cacheable();
        if cacheable
            && let Some(id) = self.snapshot.routes().id_by_route(route, preview)
            && let Some(content) = self.get_by_id(id)
        {
            return Some(content);
        }

        let content = self.resolve_route(route)?;
        // only the canonical route of a node is remembered
        if cacheable && self.compute_route(content.id()).as_deref() == Some(route) {
            self.snapshot
                .routes()
                .store_stamped(stamp, content.id(), route, preview);
        }
        Some(content)
    }

    /// Route of a node, or `None` when it (or an ancestor) is not visible.
    pub fn get_route_by_id(&self, id: i32) -> Option<String> {
        let preview = self.is_previewing();
        let stamp = self.snapshot.routes().stamp();
        let cacheable = self.routes_cacheable();
        if cacheable && let Some(route) = self.snapshot.routes().route(id, preview) {
            return Some(route);
        }

        let route = self.compute_route(id)?;
        if cacheable {
            self.snapshot.routes().store_stamped(stamp, id, &route, preview);
        }
        Some(route)
    }

    /// Routes computed against an older generation must not leak into the
    /// shared cache. Checked after the route stamp is taken: a publish that
    /// lands later invalidates the stamp.
    fn routes_cacheable(&self) -> bool {
        self.kind() == ItemKind::Content
            && self.store.is_current(self.generation)
            && self.snapshot.domains_are_current()
    }

    fn compute_route(&self, id: i32) -> Option<String> {
        let domains = self.snapshot.domains();
        let mut segments = Vec::new();
        let mut domain_root = None;
        let mut current = self.get_by_id(id)?;
        loop {
            if domains.has_assigned(current.id()) {
                domain_root = Some(current.id());
                break;
            }
            segments.push(current.url_segment(None)?);
            if current.parent_id() == ROOT_PARENT_ID {
                break;
            }
            current = self.get_by_id(current.parent_id())?;
        }

        if domain_root.is_none() && self.snapshot.config().hide_top_level_node {
            self.hide_top_level(id, &mut segments);
        }

        segments.reverse();
        let path = format!("/{}", segments.join("/"));
        let route = match domain_root {
            Some(root) => format!("{root}{path}"),
            None => path,
        };
        trace!(id, route = %route, "Route computed");
        Some(route)
    }

    /// `segments` runs leaf first, so the top-level segment is the last one.
    fn hide_top_level(&self, id: i32, segments: &mut Vec<String>) {
        if segments.len() > 1 {
            segments.pop();
            return;
        }
        // only the first root owns `/`; other top-level nodes keep their segment
        let is_first_root = self
            .get_at_root()
            .first()
            .is_some_and(|root| root.id() == id);
        if is_first_root {
            segments.clear();
        }
    }

    fn resolve_route(&self, route: &str) -> Option<Arc<PublishedContent>> {
        let (start_id, path) = match route.find('/')? {
            0 => (None, route),
            pos => (Some(route[..pos].parse::<i32>().ok()?), &route[pos..]),
        };
        let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();

        if let Some(start_id) = start_id {
            return self.follow(self.get_by_id(start_id)?, &parts);
        }

        let roots = self.get_at_root();
        let Some((first, rest)) = parts.split_first() else {
            return roots.into_iter().next();
        };

        if !self.snapshot.config().hide_top_level_node {
            let root = roots.into_iter().find(|root| segment_matches(root, first))?;
            return self.follow(root, rest);
        }

        // the top-level segment is hidden, so `/foo` names a child of some root
        let under_root = roots
            .iter()
            .flat_map(|root| self.children_of(root.id()))
            .find(|child| segment_matches(child, first))
            .and_then(|child| self.follow(child, rest));
        if under_root.is_some() || !rest.is_empty() {
            return under_root;
        }
        // ...or a non-default top-level node, which keeps its segment
        roots.into_iter().find(|root| segment_matches(root, first))
    }

    fn follow(
        &self,
        mut content: Arc<PublishedContent>,
        parts: &[&str],
    ) -> Option<Arc<PublishedContent>> {
        for part in parts {
            content = self
                .children_of(content.id())
                .into_iter()
                .find(|child| segment_matches(child, part))?;
        }
        Some(content)
    }
}

fn segment_matches(content: &PublishedContent, part: &str) -> bool {
    content
        .url_segment(None)
        .is_some_and(|segment| segment.eq_ignore_ascii_case(part))
}
