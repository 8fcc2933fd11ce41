//! Node registry: the arena every world node lives in.
//!
//! Nodes are stored in a slotmap and threaded, on insertion, onto a
//! per-kind singly linked list (newest first, matching load order reversed)
//! and into the name index of their lookup class. Sector membership and
//! render lists are owned by the spatial grid, not here.

use std::collections::HashMap;

use slotmap::SlotMap;
use tracing::warn;

use crate::context::WorldConfig;
use crate::error::WorldError;
use crate::id::NodeId;
use crate::node::{NodeKind, WorldNode};

/// Name-lookup classes. Only these kinds are findable by name; the rest
/// keep their names for logging and telemetry only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameClass {
    Track,
    Traction,
    PowerSource,
    Model,
    MemoryCell,
    Sound,
    Vehicle,
}

impl NameClass {
    pub fn of(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Track => Some(NameClass::Track),
            NodeKind::Traction => Some(NameClass::Traction),
            NodeKind::PowerSource => Some(NameClass::PowerSource),
            NodeKind::Model | NodeKind::Terrain => Some(NameClass::Model),
            NodeKind::MemoryCell => Some(NameClass::MemoryCell),
            NodeKind::Sound => Some(NameClass::Sound),
            NodeKind::Vehicle => Some(NameClass::Vehicle),
            _ => None,
        }
    }
}

/// The world node arena and its indexes.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: SlotMap<NodeId, WorldNode>,

    /// Head of the per-kind list; `WorldNode::next_of_kind` continues it.
    kind_heads: [Option<NodeId>; NodeKind::COUNT],
    kind_counts: [usize; NodeKind::COUNT],

    /// (class, name) to newest node of that name. Later loads shadow
    /// earlier ones.
    by_name: HashMap<(NameClass, String), NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn count_of(&self, kind: NodeKind) -> usize {
        self.kind_counts[kind.index()]
    }

    /// Insert a node, thread it onto its kind list, and index its name.
    ///
    /// A duplicate name within a class shadows the earlier node; for rail
    /// tracks, memory cells and models that is worth a warning, since
    /// events resolve by name and silently retargeting one is a scenario
    /// bug. Names matching a configured suppression pattern are
    /// known-duplicated decor and stay quiet.
    pub fn insert(&mut self, node: WorldNode, config: &WorldConfig) -> NodeId {
        let kind = node.kind();
        let slot = kind.index();
        let named = node.is_named();
        let name = node.name.clone();
        let rail = node.as_track().map(|t| t.is_rail()).unwrap_or(false);

        let id = self.nodes.insert(node);
        if let Some(node) = self.nodes.get_mut(id) {
            node.next_of_kind = self.kind_heads[slot];
        }
        self.kind_heads[slot] = Some(id);
        self.kind_counts[slot] += 1;

        if named
            && let Some(class) = NameClass::of(kind)
            && self.by_name.insert((class, name.clone()), id).is_some()
        {
            let warns = match class {
                NameClass::Track => rail,
                NameClass::MemoryCell | NameClass::Model => true,
                _ => false,
            };
            if warns && !Self::suppressed(&name, config) {
                warn!(name = %name, class = ?class, "duplicate name, events now target the later node");
            }
        }
        id
    }

    fn suppressed(name: &str, config: &WorldConfig) -> bool {
        config
            .suppress_duplicate_prefixes
            .iter()
            .any(|p| name.starts_with(p.as_str()))
            || config
                .suppress_duplicate_suffixes
                .iter()
                .any(|s| name.ends_with(s.as_str()))
    }

    pub fn get(&self, id: NodeId) -> Option<&WorldNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut WorldNode> {
        self.nodes.get_mut(id)
    }

    /// Two distinct nodes, mutably. Fails on stale ids or aliasing.
    pub fn get_pair_mut(
        &mut self,
        a: NodeId,
        b: NodeId,
    ) -> Result<(&mut WorldNode, &mut WorldNode), WorldError> {
        match self.nodes.get_disjoint_mut([a, b]) {
            Some([a, b]) => Ok((a, b)),
            None => Err(WorldError::StaleNode),
        }
    }

    pub fn remove(&mut self, id: NodeId) -> Option<WorldNode> {
        let node = self.nodes.remove(id)?;
        let slot = node.kind().index();
        self.kind_counts[slot] -= 1;
        // Unthread from the kind list.
        if self.kind_heads[slot] == Some(id) {
            self.kind_heads[slot] = node.next_of_kind;
        } else {
            let mut cursor = self.kind_heads[slot];
            while let Some(c) = cursor {
                let next = self.nodes.get(c).and_then(|n| n.next_of_kind);
                if next == Some(id) {
                    if let Some(n) = self.nodes.get_mut(c) {
                        n.next_of_kind = node.next_of_kind;
                    }
                    break;
                }
                cursor = next;
            }
        }
        if node.is_named()
            && let Some(class) = NameClass::of(node.kind())
        {
            let key = (class, node.name.clone());
            if self.by_name.get(&key) == Some(&id) {
                self.by_name.remove(&key);
            }
        }
        Some(node)
    }

    /// Newest node of this class with this name. "none" never matches.
    pub fn find(&self, class: NameClass, name: &str) -> Option<NodeId> {
        if name.is_empty() || name == "none" {
            return None;
        }
        self.by_name.get(&(class, name.to_string())).copied()
    }

    /// Walk the per-kind list, newest insertion first.
    pub fn iter_kind(&self, kind: NodeKind) -> KindIter<'_> {
        KindIter {
            registry: self,
            cursor: self.kind_heads[kind.index()],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &WorldNode)> {
        self.nodes.iter()
    }

    pub fn ids_of(&self, kind: NodeKind) -> Vec<NodeId> {
        self.iter_kind(kind).collect()
    }
}

pub struct KindIter<'a> {
    registry: &'a NodeRegistry,
    cursor: Option<NodeId>,
}

impl Iterator for KindIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cursor?;
        self.cursor = self.registry.nodes.get(id).and_then(|n| n.next_of_kind);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::memcell::MemoryCell;
    use crate::node::NodePayload;
    use crate::track::{Track, TrackKind};

    fn track_node(name: &str) -> WorldNode {
        WorldNode::new(
            name,
            Vec3::ZERO,
            NodePayload::Track(Track::new(
                TrackKind::Normal,
                Vec3::ZERO,
                Vec3::new(12.5, 0.0, 0.0),
                Vec3::new(25.0, 0.0, 0.0),
            )),
        )
    }

    #[test]
    fn kind_list_is_newest_first() {
        let config = WorldConfig::default();
        let mut reg = NodeRegistry::new();
        let a = reg.insert(track_node("a"), &config);
        let b = reg.insert(track_node("b"), &config);
        let c = reg.insert(track_node("c"), &config);
        let ids: Vec<_> = reg.iter_kind(NodeKind::Track).collect();
        assert_eq!(ids, vec![c, b, a]);
        assert_eq!(reg.count_of(NodeKind::Track), 3);
    }

    #[test]
    fn duplicate_name_shadows_earlier() {
        let config = WorldConfig::default();
        let mut reg = NodeRegistry::new();
        let first = reg.insert(
            WorldNode::new(
                "cell1",
                Vec3::ZERO,
                NodePayload::MemoryCell(MemoryCell::default()),
            ),
            &config,
        );
        let second = reg.insert(
            WorldNode::new(
                "cell1",
                Vec3::ZERO,
                NodePayload::MemoryCell(MemoryCell::default()),
            ),
            &config,
        );
        assert_ne!(first, second);
        assert_eq!(reg.find(NameClass::MemoryCell, "cell1"), Some(second));
    }

    #[test]
    fn remove_unthreads_and_unindexes() {
        let config = WorldConfig::default();
        let mut reg = NodeRegistry::new();
        let a = reg.insert(track_node("zw1"), &config);
        let b = reg.insert(track_node("zw2"), &config);
        reg.remove(b);
        assert_eq!(reg.find(NameClass::Track, "zw2"), None);
        assert_eq!(reg.ids_of(NodeKind::Track), vec![a]);
        reg.remove(a);
        assert!(reg.ids_of(NodeKind::Track).is_empty());
    }

    #[test]
    fn pair_access_rejects_aliasing() {
        let config = WorldConfig::default();
        let mut reg = NodeRegistry::new();
        let a = reg.insert(track_node("t1"), &config);
        let b = reg.insert(track_node("t2"), &config);
        assert!(reg.get_pair_mut(a, b).is_ok());
        assert!(reg.get_pair_mut(a, a).is_err());
    }

    #[test]
    fn none_never_resolves() {
        let config = WorldConfig::default();
        let mut reg = NodeRegistry::new();
        reg.insert(track_node("none"), &config);
        assert_eq!(reg.find(NameClass::Track, "none"), None);
    }
}
