//! Change plan generation.
//!
//! Merges a batch of cache events into the set of actions the consumer
//! executes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use nucache_records::ItemKind;

use super::events::{CacheEvent, Epoch, EventKind, RefreshScope};

/// What happens to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    Refresh(RefreshScope),
    Remove,
}

impl NodeAction {
    /// Merge a later action into this one. Two refreshes keep the wider
    /// scope; otherwise the later action wins.
    fn then(self, later: NodeAction) -> NodeAction {
        match (self, later) {
            (NodeAction::Refresh(RefreshScope::Branch), NodeAction::Refresh(_))
            | (NodeAction::Refresh(_), NodeAction::Refresh(RefreshScope::Branch)) => {
                NodeAction::Refresh(RefreshScope::Branch)
            }
            (_, later) => later,
        }
    }
}

/// Merged actions for one batch of events.
#[derive(Debug, Default)]
pub struct ChangePlan {
    /// Latest action per node.
    pub nodes: BTreeMap<(ItemKind, i32), NodeAction>,
    pub content_types: BTreeSet<i32>,
    pub data_types: BTreeSet<i32>,
    pub domains: bool,
    pub refresh_all: bool,
}

impl fmt::Display for ChangePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChangePlan {{ nodes: {}, content_types: {}, data_types: {}, domains: {}, refresh_all: {} }}",
            self.nodes.len(),
            self.content_types.len(),
            self.data_types.len(),
            self.domains,
            self.refresh_all,
        )
    }
}

impl ChangePlan {
    /// Merge events into a plan.
    ///
    /// - Deduplicates by event ID
    /// - Keeps the latest epoch per node, widening refreshes to the largest
    ///   scope asked for
    /// - Unions type, data-type and domain changes
    pub fn from_events(events: Vec<CacheEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();
        let mut latest: HashMap<(ItemKind, i32), (Epoch, NodeAction)> = HashMap::new();

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            let action = match event.kind {
                EventKind::ContentRefreshed { scope, .. } | EventKind::MediaRefreshed { scope, .. } => {
                    Some(NodeAction::Refresh(scope))
                }
                EventKind::MemberRefreshed { .. } => Some(NodeAction::Refresh(RefreshScope::Node)),
                EventKind::ContentRemoved { .. }
                | EventKind::MediaRemoved { .. }
                | EventKind::MemberRemoved { .. } => Some(NodeAction::Remove),
                EventKind::ContentTypeChanged { id } => {
                    plan.content_types.insert(id);
                    None
                }
                EventKind::DataTypeChanged { id } => {
                    plan.data_types.insert(id);
                    None
                }
                EventKind::DomainsChanged => {
                    plan.domains = true;
                    None
                }
                EventKind::RefreshAll => {
                    plan.refresh_all = true;
                    None
                }
            };

            if let (Some(action), Some(target)) = (action, event.kind.target()) {
                latest
                    .entry(target)
                    .and_modify(|(epoch, current)| {
                        if event.epoch > *epoch {
                            *epoch = event.epoch;
                            *current = current.then(action);
                        } else {
                            *current = action.then(*current);
                        }
                    })
                    .or_insert((event.epoch, action));
            }
        }

        plan.nodes = latest
            .into_iter()
            .map(|(target, (_, action))| (target, action))
            .collect();
        plan
    }

    /// Nodes of one kind, in id order.
    pub fn nodes_of(&self, kind: ItemKind) -> impl Iterator<Item = (i32, NodeAction)> + '_ {
        self.nodes
            .iter()
            .filter(move |((node_kind, _), _)| *node_kind == kind)
            .map(|((_, id), action)| (*id, *action))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.content_types.is_empty()
            && self.data_types.is_empty()
            && !self.domains
            && !self.refresh_all
    }
}
