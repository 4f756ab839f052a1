//! Immutable content generations.
//!
//! A [`Generation`] is one published version of a whole content tree: a live
//! map, a draft overlay, a key index and the parent → children topology.
//! The indexes are persistent maps: building the next generation shares
//! every untouched entry with the previous one, so a change costs what it
//! touches rather than the size of the tree. Once built, a generation is
//! never mutated; readers holding it keep a fully consistent view.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, OnceLock};

use imbl::HashMap;
use nucache_records::{ContentNodeKit, ItemKind, ROOT_PARENT_ID};
use tracing::debug;
use uuid::Uuid;

use crate::cache::content_types::ContentTypeLookup;
use crate::domain::error::CacheError;

use super::published::{ContentNode, PublishedContent};

/// A map entry: a node, or the marker left by the generation that removed it.
#[derive(Debug, Clone)]
pub enum Slot<T> {
    Node(T),
    Tombstone { removed_in: u64 },
}

impl<T> Slot<T> {
    pub fn node(&self) -> Option<&T> {
        match self {
            Self::Node(node) => Some(node),
            Self::Tombstone { .. } => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone { .. })
    }
}

/// Live version of a node plus its lazily built preview clone.
#[derive(Debug)]
pub struct LiveEntry {
    content: Arc<PublishedContent>,
    preview: OnceLock<Arc<PublishedContent>>,
}

impl LiveEntry {
    fn new(content: PublishedContent) -> Self {
        Self {
            content: Arc::new(content),
            preview: OnceLock::new(),
        }
    }

    pub fn content(&self) -> &Arc<PublishedContent> {
        &self.content
    }

    fn preview(&self) -> &Arc<PublishedContent> {
        self.preview
            .get_or_init(|| Arc::new(self.content.create_preview_clone()))
    }
}

/// Upserts and removals applied together to build a new generation.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub upserts: Vec<ContentNodeKit>,
    pub removals: Vec<i32>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }
}

/// One immutable version of a content store.
#[derive(Debug, Clone)]
pub struct Generation {
    number: u64,
    kind: ItemKind,
    live: HashMap<i32, Slot<Arc<LiveEntry>>>,
    drafts: HashMap<i32, Slot<Arc<PublishedContent>>>,
    structure: HashMap<i32, Arc<ContentNode>>,
    keys: HashMap<Uuid, i32>,
    children: HashMap<i32, Arc<Vec<i32>>>,
    /// Ids tombstoned by this generation, purged by the next one.
    buried: Vec<i32>,
}

impl Generation {
    pub fn empty(kind: ItemKind) -> Self {
        Self {
            number: 0,
            kind,
            live: HashMap::new(),
            drafts: HashMap::new(),
            structure: HashMap::new(),
            keys: HashMap::new(),
            children: HashMap::new(),
            buried: Vec::new(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Nodes present in this generation, in either mode.
    pub fn len(&self) -> usize {
        self.structure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_empty()
    }

    pub fn tombstones(&self) -> usize {
        self.live.values().filter(|slot| slot.is_tombstone()).count()
    }

    /// Preview reads use the draft overlay, falling back to a preview clone of
    /// the live node.
    pub fn get(&self, id: i32, preview: bool) -> Option<Arc<PublishedContent>> {
        if preview {
            match self.drafts.get(&id) {
                Some(Slot::Node(draft)) => return Some(Arc::clone(draft)),
                Some(Slot::Tombstone { .. }) => return None,
                None => {}
            }
            return self
                .live
                .get(&id)
                .and_then(Slot::node)
                .map(|entry| Arc::clone(entry.preview()));
        }
        self.live
            .get(&id)
            .and_then(Slot::node)
            .map(|entry| Arc::clone(entry.content()))
    }

    pub fn contains(&self, id: i32, preview: bool) -> bool {
        if preview && matches!(self.drafts.get(&id), Some(Slot::Node(_))) {
            return true;
        }
        matches!(self.live.get(&id), Some(Slot::Node(_)))
    }

    pub fn id_for_key(&self, key: Uuid) -> Option<i32> {
        self.keys.get(&key).copied()
    }

    pub fn get_by_key(&self, key: Uuid, preview: bool) -> Option<Arc<PublishedContent>> {
        self.id_for_key(key).and_then(|id| self.get(id, preview))
    }

    /// Structural node, regardless of publish state.
    pub fn node(&self, id: i32) -> Option<&Arc<ContentNode>> {
        self.structure.get(&id)
    }

    /// Child ids in sort order, regardless of publish state.
    pub fn child_ids(&self, parent_id: i32) -> &[i32] {
        self.children
            .get(&parent_id)
            .map(|ids| ids.as_slice())
            .unwrap_or_default()
    }

    /// Children visible in the given mode, in sort order.
    pub fn children(&self, parent_id: i32, preview: bool) -> Vec<Arc<PublishedContent>> {
        self.child_ids(parent_id)
            .iter()
            .filter_map(|id| self.get(*id, preview))
            .collect()
    }

    pub fn at_root(&self, preview: bool) -> Vec<Arc<PublishedContent>> {
        self.children(ROOT_PARENT_ID, preview)
    }

    /// `id` and all of its descendants, depth first.
    pub fn subtree_ids(&self, id: i32) -> Vec<i32> {
        let mut collected = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if !self.structure.contains_key(&current) {
                continue;
            }
            collected.push(current);
            pending.extend(self.child_ids(current).iter().rev());
        }
        collected
    }

    /// Ids of the content types, used by nodes in this generation, that have a
    /// property backed by `data_type_id`.
    pub fn content_type_ids_referencing(&self, data_type_id: i32) -> BTreeSet<i32> {
        self.structure
            .values()
            .map(|node| node.content_type())
            .filter(|content_type| content_type.references_data_type(data_type_id))
            .map(|content_type| content_type.id())
            .collect()
    }

    /// Build the next generation. `self` is left untouched on error.
    pub fn next(
        &self,
        changes: ChangeSet,
        types: &dyn ContentTypeLookup,
    ) -> Result<Generation, CacheError> {
        let mut next = self.clone();
        next.number = self.number + 1;
        // tombstones only serve readers of the generation that recorded them
        next.buried = Vec::new();
        for id in &self.buried {
            if next.live.get(id).is_some_and(Slot::is_tombstone) {
                next.live.remove(id);
            }
            if next.drafts.get(id).is_some_and(Slot::is_tombstone) {
                next.drafts.remove(id);
            }
        }

        let mut touched = HashSet::new();
        for id in changes.removals {
            next.remove_subtree(id, &mut touched);
        }

        let (empty, mut pending): (Vec<_>, Vec<_>) =
            changes.upserts.into_iter().partition(ContentNodeKit::is_empty);
        for kit in empty {
            next.remove_subtree(kit.node.id, &mut touched);
        }

        pending.sort_by_key(|kit| kit.node.level);
        // parents first; anything whose parent never shows up is an orphan
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for kit in pending {
                let parent_id = kit.node.parent_id;
                if parent_id == ROOT_PARENT_ID || next.structure.contains_key(&parent_id) {
                    next.upsert(kit, types, &mut touched)?;
                } else {
                    deferred.push(kit);
                }
            }
            if deferred.len() == before
                && let Some(orphan) = deferred.first()
            {
                return Err(CacheError::OrphanNode {
                    kind: self.kind,
                    id: orphan.node.id,
                    parent_id: orphan.node.parent_id,
                });
            }
            pending = deferred;
        }

        next.sort_children(&touched);
        debug!(
            kind = %next.kind,
            generation = next.number,
            nodes = next.structure.len(),
            touched_parents = touched.len(),
            "Generation built"
        );
        Ok(next)
    }

    /// A fresh generation holding exactly `kits`.
    pub fn rebuild(
        kind: ItemKind,
        number: u64,
        kits: Vec<ContentNodeKit>,
        types: &dyn ContentTypeLookup,
    ) -> Result<Generation, CacheError> {
        let mut base = Generation::empty(kind);
        base.number = number.saturating_sub(1);
        base.next(
            ChangeSet {
                upserts: kits,
                removals: Vec::new(),
            },
            types,
        )
    }

    fn upsert(
        &mut self,
        kit: ContentNodeKit,
        types: &dyn ContentTypeLookup,
        touched: &mut HashSet<i32>,
    ) -> Result<(), CacheError> {
        let content_type = types.content_type_by_id(self.kind, kit.node.content_type_id)?;
        let node = Arc::new(ContentNode::new(&kit.node, content_type));
        let id = node.id();

        if let Some(previous) = self.structure.get(&id).cloned() {
            if previous.parent_id() != node.parent_id() {
                self.detach(id, previous.parent_id(), touched);
                self.attach(id, node.parent_id(), touched);
            } else if previous.sort_order() != node.sort_order() {
                touched.insert(node.parent_id());
            }
            if previous.key() != node.key() {
                self.keys.remove(&previous.key());
            }
        } else {
            self.attach(id, node.parent_id(), touched);
        }

        match kit.published {
            Some(data) => {
                let content = PublishedContent::new(Arc::clone(&node), &data, false);
                self.live.insert(id, Slot::Node(Arc::new(LiveEntry::new(content))));
            }
            None => self.bury_live(id),
        }
        match kit.draft {
            Some(data) => {
                let content = PublishedContent::new(Arc::clone(&node), &data, true);
                self.drafts.insert(id, Slot::Node(Arc::new(content)));
            }
            // preview falls back to the live node
            None => {
                self.drafts.remove(&id);
            }
        }

        self.keys.insert(node.key(), id);
        self.structure.insert(id, node);
        Ok(())
    }

    fn remove_subtree(&mut self, id: i32, touched: &mut HashSet<i32>) {
        let ids = self.subtree_ids(id);
        if let Some(root) = self.structure.get(&id) {
            let parent_id = root.parent_id();
            self.detach(id, parent_id, touched);
        }
        for removed in ids {
            self.bury_live(removed);
            self.bury_draft(removed);
            self.children.remove(&removed);
            if let Some(node) = self.structure.remove(&removed) {
                self.keys.remove(&node.key());
            }
        }
    }

    fn bury_live(&mut self, id: i32) {
        if self.live.contains_key(&id) {
            self.live.insert(
                id,
                Slot::Tombstone {
                    removed_in: self.number,
                },
            );
            self.buried.push(id);
        }
    }

    fn bury_draft(&mut self, id: i32) {
        if self.drafts.contains_key(&id) {
            self.drafts.insert(
                id,
                Slot::Tombstone {
                    removed_in: self.number,
                },
            );
            self.buried.push(id);
        }
    }

    fn attach(&mut self, id: i32, parent_id: i32, touched: &mut HashSet<i32>) {
        match self.children.get_mut(&parent_id) {
            Some(siblings) => Arc::make_mut(siblings).push(id),
            None => {
                self.children.insert(parent_id, Arc::new(vec![id]));
            }
        }
        touched.insert(parent_id);
    }

    fn detach(&mut self, id: i32, parent_id: i32, touched: &mut HashSet<i32>) {
        if let Some(siblings) = self.children.get_mut(&parent_id) {
            Arc::make_mut(siblings).retain(|sibling| *sibling != id);
            touched.insert(parent_id);
        }
    }

    fn sort_children(&mut self, touched: &HashSet<i32>) {
        for parent_id in touched {
            let Some(ids) = self.children.get_mut(parent_id) else {
                continue;
            };
            if ids.is_empty() {
                self.children.remove(parent_id);
                continue;
            }
            let structure = &self.structure;
            Arc::make_mut(ids).sort_by_key(|id| {
                (
                    structure.get(id).map_or(i32::MAX, |node| node.sort_order()),
                    *id,
                )
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use nucache_records::{ContentTypeRecord, ContentVariation, PropertyTypeRecord, ValueType};
    use serde_json::json;

    use crate::domain::content_type::PublishedContentType;
    use crate::domain::value::ConverterRegistry;

    use super::*;

    pub(crate) struct StaticTypes(pub Arc<PublishedContentType>);

    impl StaticTypes {
        pub(crate) fn page() -> Self {
            let record = ContentTypeRecord {
                id: 1,
                alias: "page".to_string(),
                kind: ItemKind::Content,
                variations: ContentVariation::Nothing,
                compositions: Vec::new(),
                property_types: vec![PropertyTypeRecord {
                    alias: "title".to_string(),
                    data_type_id: 1,
                    editor_alias: String::new(),
                    value_type: ValueType::Text,
                    variations: ContentVariation::Nothing,
                    cache_level: None,
                }],
            };
            Self(Arc::new(
                PublishedContentType::from_record(&record, &ConverterRegistry::new()).expect("type"),
            ))
        }
    }

    impl ContentTypeLookup for StaticTypes {
        fn content_type(
            &self,
            kind: ItemKind,
            alias: &str,
        ) -> Result<Arc<PublishedContentType>, CacheError> {
            if alias == self.0.alias() {
                Ok(Arc::clone(&self.0))
            } else {
                Err(CacheError::content_type_not_found(
                    kind,
                    crate::domain::error::TypeKey::Alias(alias.to_string()),
                ))
            }
        }

        fn content_type_by_id(
            &self,
            kind: ItemKind,
            id: i32,
        ) -> Result<Arc<PublishedContentType>, CacheError> {
            if id == self.0.id() {
                Ok(Arc::clone(&self.0))
            } else {
                Err(CacheError::content_type_not_found(
                    kind,
                    crate::domain::error::TypeKey::Id(id),
                ))
            }
        }
    }

    pub(crate) fn kit(id: i32, parent_id: i32, sort_order: i32, published: bool, draft: bool) -> ContentNodeKit {
        let data = |name: String| {
            json!({ "name": name, "published": published, "properties": { "title": [ { "value": name } ] } })
        };
        let published_data = published.then(|| data(format!("Node {id}")));
        let draft_data = draft.then(|| data(format!("Draft {id}")));
        serde_json::from_value(json!({
            "node": {
                "id": id,
                "key": Uuid::from_u128(id as u128),
                "parent_id": parent_id,
                "sort_order": sort_order,
                "content_type_id": 1
            },
            "published": published_data,
            "draft": draft_data,
        }))
        .expect("kit")
    }

    fn build(kits: Vec<ContentNodeKit>) -> Generation {
        Generation::rebuild(ItemKind::Content, 1, kits, &StaticTypes::page()).expect("generation")
    }

    #[test]
    fn never_inserted_ids_are_not_found() {
        let generation = build(vec![kit(1, -1, 0, true, false)]);
        assert_eq!(generation.number(), 1);
        assert!(generation.get(99, false).is_none());
        assert!(generation.get(99, true).is_none());
    }

    #[test]
    fn preview_prefers_draft_then_clones_live() {
        let generation = build(vec![
            kit(1, -1, 0, true, true),
            kit(2, -1, 1, true, false),
            kit(3, -1, 2, false, true),
        ]);

        assert_eq!(generation.get(1, true).expect("draft").name(None), "Draft 1");
        assert_eq!(generation.get(1, false).expect("live").name(None), "Node 1");

        let preview = generation.get(2, true).expect("preview clone");
        assert!(preview.is_preview());
        assert_eq!(preview.name(None), "Node 2");
        let again = generation.get(2, true).expect("preview clone");
        assert!(Arc::ptr_eq(&preview, &again));

        assert!(generation.get(3, false).is_none());
        assert!(generation.contains(3, true));
    }

    #[test]
    fn children_are_sorted_and_filtered_by_mode() {
        let generation = build(vec![
            kit(1, -1, 0, true, false),
            kit(12, 1, 2, true, false),
            kit(11, 1, 1, true, false),
            kit(13, 1, 0, false, true),
        ]);

        let live: Vec<_> = generation.children(1, false).iter().map(|c| c.id()).collect();
        assert_eq!(live, vec![11, 12]);
        let preview: Vec<_> = generation.children(1, true).iter().map(|c| c.id()).collect();
        assert_eq!(preview, vec![13, 11, 12]);
    }

    #[test]
    fn children_may_arrive_before_parents() {
        let generation = build(vec![kit(2, 1, 0, true, false), kit(1, -1, 0, true, false)]);
        assert_eq!(generation.child_ids(1), &[2]);
    }

    #[test]
    fn orphans_are_rejected() {
        let types = StaticTypes::page();
        let base = build(vec![kit(1, -1, 0, true, false)]);
        let err = base
            .next(
                ChangeSet {
                    upserts: vec![kit(5, 404, 0, true, false)],
                    removals: Vec::new(),
                },
                &types,
            )
            .expect_err("orphan");
        assert!(matches!(err, CacheError::OrphanNode { id: 5, parent_id: 404, .. }));
        assert_eq!(base.number(), 1);
    }

    #[test]
    fn removal_tombstones_the_subtree() {
        let types = StaticTypes::page();
        let first = build(vec![
            kit(1, -1, 0, true, false),
            kit(2, 1, 0, true, true),
            kit(3, 2, 0, true, false),
            kit(4, -1, 1, true, false),
        ]);
        let second = first
            .next(
                ChangeSet {
                    upserts: Vec::new(),
                    removals: vec![2],
                },
                &types,
            )
            .expect("second");

        for id in [2, 3] {
            assert!(second.get(id, false).is_none());
            assert!(second.get(id, true).is_none());
            assert!(first.get(id, false).is_some());
        }
        assert_eq!(second.tombstones(), 2);
        assert!(second.child_ids(1).is_empty());
        assert!(second.get_by_key(Uuid::from_u128(3), false).is_none());

        // tombstones do not outlive the next generation
        let third = second.next(ChangeSet::default(), &types).expect("third");
        assert_eq!(third.tombstones(), 0);
        assert!(third.get(4, false).is_some());
    }

    #[test]
    fn unchanged_nodes_are_shared_between_generations() {
        let types = StaticTypes::page();
        let first = build(vec![kit(1, -1, 0, true, false), kit(2, -1, 1, true, false)]);
        let second = first
            .next(
                ChangeSet {
                    upserts: vec![kit(2, -1, 1, true, true)],
                    removals: Vec::new(),
                },
                &types,
            )
            .expect("second");

        let a = first.get(1, false).expect("node 1");
        let b = second.get(1, false).expect("node 1");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(
            &first.get(2, false).expect("old 2"),
            &second.get(2, false).expect("new 2")
        ));
    }

    #[test]
    fn moving_a_node_updates_both_parents() {
        let types = StaticTypes::page();
        let first = build(vec![
            kit(1, -1, 0, true, false),
            kit(2, -1, 1, true, false),
            kit(3, 1, 0, true, false),
        ]);
        let second = first
            .next(
                ChangeSet {
                    upserts: vec![kit(3, 2, 0, true, false)],
                    removals: Vec::new(),
                },
                &types,
            )
            .expect("moved");

        assert!(second.child_ids(1).is_empty());
        assert_eq!(second.child_ids(2), &[3]);
        assert_eq!(first.child_ids(1), &[3]);
    }

    #[test]
    fn data_type_references_are_found_through_nodes() {
        let generation = build(vec![kit(1, -1, 0, true, false)]);
        assert_eq!(
            generation.content_type_ids_referencing(1).into_iter().collect::<Vec<_>>(),
            vec![1]
        );
        assert!(generation.content_type_ids_referencing(2).is_empty());
    }

    #[test]
    fn unpublishing_leaves_a_live_tombstone_but_keeps_the_draft() {
        let types = StaticTypes::page();
        let first = build(vec![kit(1, -1, 0, true, false)]);
        let second = first
            .next(
                ChangeSet {
                    upserts: vec![kit(1, -1, 0, false, true)],
                    removals: Vec::new(),
                },
                &types,
            )
            .expect("second");

        assert!(second.get(1, false).is_none());
        assert_eq!(second.get(1, true).expect("draft").name(None), "Draft 1");
        assert_eq!(second.tombstones(), 1);
    }

    #[test]
    fn publishing_a_draft_falls_back_to_live_in_preview() {
        let types = StaticTypes::page();
        let first = build(vec![kit(1, -1, 0, true, true)]);
        let second = first
            .next(
                ChangeSet {
                    upserts: vec![kit(1, -1, 0, true, false)],
                    removals: Vec::new(),
                },
                &types,
            )
            .expect("published");

        assert!(second.contains(1, true));
        let preview = second.get(1, true).expect("preview clone");
        assert!(preview.is_preview());
        assert_eq!(preview.name(None), "Node 1");
        assert_eq!(second.tombstones(), 0);
        assert_eq!(first.get(1, true).expect("old draft").name(None), "Draft 1");
    }

    #[test]
    fn earlier_generations_keep_their_indexes() {
        let types = StaticTypes::page();
        let first = build(vec![
            kit(1, -1, 0, true, false),
            kit(2, 1, 0, true, false),
            kit(3, 1, 1, true, false),
        ]);
        let mut current = first.clone();
        for round in 0..10 {
            current = current
                .next(
                    ChangeSet {
                        upserts: vec![kit(100 + round, 1, 10 + round, true, false)],
                        removals: vec![if round == 0 { 2 } else { 100 + round - 1 }],
                    },
                    &types,
                )
                .expect("next");
        }

        assert_eq!(first.child_ids(1), &[2, 3]);
        assert_eq!(first.len(), 3);
        assert_eq!(current.child_ids(1), &[3, 109]);
        assert_eq!(current.len(), 3);
        // only the previous round's removal is still a tombstone
        assert_eq!(current.tombstones(), 1);
        assert!(Arc::ptr_eq(
            &first.get(3, false).expect("first 3"),
            &current.get(3, false).expect("current 3")
        ));
    }
}
