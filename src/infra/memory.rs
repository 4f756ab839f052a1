//! In-memory collaborator backed by a seed file.
//!
//! Implements both source traits over a [`SeedFile`]. The CLI loads one from
//! disk; tests build one in code and mutate it to simulate edits.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use nucache_records::{
    ContentNodeKit, ContentTypeRecord, DomainRecord, ItemKind, ROOT_PARENT_ID, SeedFile,
};
use tracing::info;

use crate::application::repos::{ContentSource, ContentTypeSource};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::error::SourceError;

use super::error::InfraError;

const SOURCE: &str = "infra::memory";

/// Seed-file-backed content and content-type source.
#[derive(Debug, Default)]
pub struct MemorySource {
    state: RwLock<SeedFile>,
}

impl MemorySource {
    pub fn new(seed: SeedFile) -> Self {
        Self {
            state: RwLock::new(seed),
        }
    }

    /// Read a JSON seed file.
    pub fn from_path(path: &Path) -> Result<Self, InfraError> {
        let raw = fs::read_to_string(path).map_err(|err| InfraError::seed_read(path, err))?;
        let seed: SeedFile =
            serde_json::from_str(&raw).map_err(|err| InfraError::seed_parse(path, err))?;
        info!(
            path = %path.display(),
            content_types = seed.content_types.len(),
            content = seed.content.len(),
            media = seed.media.len(),
            members = seed.members.len(),
            "Seed file loaded"
        );
        Ok(Self::new(seed))
    }

    pub fn seed(&self) -> SeedFile {
        rw_read(&self.state, SOURCE, "seed").clone()
    }

    pub fn upsert_content_type(&self, record: ContentTypeRecord) {
        let mut state = rw_write(&self.state, SOURCE, "upsert_content_type");
        state
            .content_types
            .retain(|existing| !(existing.kind == record.kind && existing.id == record.id));
        state.content_types.push(record);
    }

    /// Insert or replace a node kit.
    pub fn upsert_node(&self, kind: ItemKind, kit: ContentNodeKit) {
        let mut state = rw_write(&self.state, SOURCE, "upsert_node");
        let kits = kits_mut(&mut state, kind);
        match kits.iter_mut().find(|existing| existing.node.id == kit.node.id) {
            Some(existing) => *existing = kit,
            None => kits.push(kit),
        }
    }

    /// Remove a node and all of its descendants.
    pub fn remove_node(&self, kind: ItemKind, id: i32) {
        let mut state = rw_write(&self.state, SOURCE, "remove_node");
        let kits = kits_mut(&mut state, kind);
        let doomed: HashSet<i32> = branch_order(kits, id).into_iter().map(|kit| kit.node.id).collect();
        kits.retain(|kit| !doomed.contains(&kit.node.id));
    }

    pub fn set_domains(&self, domains: Vec<DomainRecord>) {
        rw_write(&self.state, SOURCE, "set_domains").domains = domains;
    }
}

fn kits_of(seed: &SeedFile, kind: ItemKind) -> &[ContentNodeKit] {
    match kind {
        ItemKind::Content => &seed.content,
        ItemKind::Media => &seed.media,
        ItemKind::Member => &seed.members,
    }
}

fn kits_mut(seed: &mut SeedFile, kind: ItemKind) -> &mut Vec<ContentNodeKit> {
    match kind {
        ItemKind::Content => &mut seed.content,
        ItemKind::Media => &mut seed.media,
        ItemKind::Member => &mut seed.members,
    }
}

fn children_index(kits: &[ContentNodeKit]) -> HashMap<i32, Vec<&ContentNodeKit>> {
    let mut children: HashMap<i32, Vec<&ContentNodeKit>> = HashMap::new();
    for kit in kits {
        children.entry(kit.node.parent_id).or_default().push(kit);
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|kit| (kit.node.sort_order, kit.node.id));
    }
    children
}

/// Breadth-first from `start_parent`, so parents always precede children.
fn walk<'a>(
    children: &HashMap<i32, Vec<&'a ContentNodeKit>>,
    start: Vec<&'a ContentNodeKit>,
) -> Vec<&'a ContentNodeKit> {
    let mut ordered = Vec::new();
    let mut queue: VecDeque<&ContentNodeKit> = start.into();
    while let Some(kit) = queue.pop_front() {
        ordered.push(kit);
        if let Some(next) = children.get(&kit.node.id) {
            queue.extend(next.iter().copied());
        }
    }
    ordered
}

fn tree_order(kits: &[ContentNodeKit]) -> Vec<ContentNodeKit> {
    let children = children_index(kits);
    let roots = children.get(&ROOT_PARENT_ID).cloned().unwrap_or_default();
    let mut ordered = walk(&children, roots);

    // unreachable kits go last so the store can report them as orphans
    let reached: HashSet<i32> = ordered.iter().map(|kit| kit.node.id).collect();
    ordered.extend(kits.iter().filter(|kit| !reached.contains(&kit.node.id)));
    ordered.into_iter().cloned().collect()
}

fn branch_order(kits: &[ContentNodeKit], id: i32) -> Vec<ContentNodeKit> {
    let children = children_index(kits);
    let start: Vec<_> = kits.iter().filter(|kit| kit.node.id == id).collect();
    walk(&children, start).into_iter().cloned().collect()
}

impl ContentTypeSource for MemorySource {
    fn content_type_by_alias(
        &self,
        kind: ItemKind,
        alias: &str,
    ) -> Result<Option<ContentTypeRecord>, SourceError> {
        Ok(rw_read(&self.state, SOURCE, "content_type_by_alias")
            .content_types
            .iter()
            .find(|record| record.kind == kind && record.alias.eq_ignore_ascii_case(alias))
            .cloned())
    }

    fn content_type_by_id(
        &self,
        kind: ItemKind,
        id: i32,
    ) -> Result<Option<ContentTypeRecord>, SourceError> {
        Ok(rw_read(&self.state, SOURCE, "content_type_by_id")
            .content_types
            .iter()
            .find(|record| record.kind == kind && record.id == id)
            .cloned())
    }
}

impl ContentSource for MemorySource {
    fn load_node(&self, kind: ItemKind, id: i32) -> Result<Option<ContentNodeKit>, SourceError> {
        let state = rw_read(&self.state, SOURCE, "load_node");
        Ok(kits_of(&state, kind)
            .iter()
            .find(|kit| kit.node.id == id)
            .cloned())
    }

    fn load_branch(&self, kind: ItemKind, id: i32) -> Result<Vec<ContentNodeKit>, SourceError> {
        let state = rw_read(&self.state, SOURCE, "load_branch");
        Ok(branch_order(kits_of(&state, kind), id))
    }

    fn load_all(&self, kind: ItemKind) -> Result<Vec<ContentNodeKit>, SourceError> {
        let state = rw_read(&self.state, SOURCE, "load_all");
        Ok(tree_order(kits_of(&state, kind)))
    }

    fn load_by_content_types(
        &self,
        kind: ItemKind,
        content_type_ids: &[i32],
    ) -> Result<Vec<ContentNodeKit>, SourceError> {
        let state = rw_read(&self.state, SOURCE, "load_by_content_types");
        Ok(tree_order(kits_of(&state, kind))
            .into_iter()
            .filter(|kit| content_type_ids.contains(&kit.node.content_type_id))
            .collect())
    }

    fn load_domains(&self) -> Result<Vec<DomainRecord>, SourceError> {
        Ok(rw_read(&self.state, SOURCE, "load_domains").domains.clone())
    }
}
