//! Guide state
//!
//! [`GuideState`] is the complete relational state of one guide: an id-indexed
//! arena of tree nodes, the crosslink edge list, filters, spaces, assignments and
//! the children caches. It is what a [`GuideStore`](super::GuideStore) persists.
//!
//! All queries here are read-only. Mutations go through
//! [`GuideTransaction`](crate::operations::GuideTransaction).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::nuid::NuidManager;
use crate::models::{
    ChildrenCache, Crosslink, CrosslinkId, MatrixFilter, MatrixFilterSpace, MetaNode, MetaNodeId,
    NodeFilterSpace, NodeFilterSpaceId, NodeId, NuidPair, SpaceId, TreeNode,
};

/// Monotonic id counters, ids are never reused
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdSequences {
    pub node: u64,
    pub meta_node: u64,
    pub crosslink: u64,
    pub filter_space: u64,
    pub node_filter_space: u64,
}

impl IdSequences {
    fn bump(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }

    pub fn next_node(&mut self) -> NodeId {
        Self::bump(&mut self.node)
    }

    pub fn next_meta_node(&mut self) -> MetaNodeId {
        Self::bump(&mut self.meta_node)
    }

    pub fn next_crosslink(&mut self) -> CrosslinkId {
        Self::bump(&mut self.crosslink)
    }

    pub fn next_filter_space(&mut self) -> SpaceId {
        Self::bump(&mut self.filter_space)
    }

    pub fn next_node_filter_space(&mut self) -> NodeFilterSpaceId {
        Self::bump(&mut self.node_filter_space)
    }
}

/// A child as seen from one parent: tree child or crosslinked child
#[derive(Debug, Clone, Copy)]
pub struct EffectiveChild<'a> {
    pub node: &'a TreeNode,
    pub crosslink: Option<&'a Crosslink>,
}

impl<'a> EffectiveChild<'a> {
    /// Position below this parent
    pub fn position(&self) -> u32 {
        self.crosslink.map_or(self.node.position, |c| c.position)
    }

    /// Decision rule below this parent, the crosslink's own rule wins
    pub fn decision_rule(&self) -> Option<&'a str> {
        match self.crosslink {
            Some(link) => link.decision_rule.as_deref(),
            None => self.node.decision_rule.as_deref(),
        }
    }

    pub fn is_crosslink(&self) -> bool {
        self.crosslink.is_some()
    }
}

/// Relational state of one guide
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuideState {
    pub guide_id: u64,
    pub guide_name: String,
    pub nodes: BTreeMap<NodeId, TreeNode>,
    pub meta_nodes: BTreeMap<MetaNodeId, MetaNode>,
    pub crosslinks: BTreeMap<CrosslinkId, Crosslink>,
    pub matrix_filters: BTreeMap<Uuid, MatrixFilter>,
    pub filter_spaces: BTreeMap<SpaceId, MatrixFilterSpace>,
    pub node_filter_spaces: BTreeMap<NodeFilterSpaceId, NodeFilterSpace>,

    /// parent node id → cache document
    pub children_caches: BTreeMap<NodeId, ChildrenCache>,

    pub sequences: IdSequences,
}

impl GuideState {
    pub fn new(guide_id: u64, guide_name: impl Into<String>) -> Self {
        Self {
            guide_id,
            guide_name: guide_name.into(),
            ..Self::default()
        }
    }

    // ---- nodes -------------------------------------------------------------

    pub fn root(&self) -> Option<&TreeNode> {
        self.nodes.values().find(|n| n.is_root())
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn node_by_nuid(&self, nuid: &str) -> Option<&TreeNode> {
        self.nodes.values().find(|n| n.nuid == nuid)
    }

    pub fn node_by_uuid(&self, name_uuid: &Uuid) -> Option<&TreeNode> {
        self.nodes.values().find(|n| &n.name_uuid == name_uuid)
    }

    pub fn meta_node(&self, id: MetaNodeId) -> Option<&MetaNode> {
        self.meta_nodes.get(&id)
    }

    pub fn meta_for(&self, node: &TreeNode) -> Option<&MetaNode> {
        self.meta_nodes.get(&node.meta_node_id)
    }

    /// Number of tree nodes using a meta node
    pub fn meta_node_references(&self, meta_node_id: MetaNodeId) -> usize {
        self.nodes
            .values()
            .filter(|n| n.meta_node_id == meta_node_id)
            .count()
    }

    /// Direct tree children, ordered by position then nuid
    pub fn tree_children(&self, id: NodeId) -> Vec<&TreeNode> {
        let Some(parent) = self.node(id) else {
            return Vec::new();
        };
        let mut children: Vec<&TreeNode> = self
            .nodes
            .values()
            .filter(|n| NuidManager::is_direct_child(&n.nuid, &parent.nuid))
            .collect();
        children.sort_by(|a, b| (a.position, &a.nuid).cmp(&(b.position, &b.nuid)));
        children
    }

    pub fn has_tree_children(&self, id: NodeId) -> bool {
        self.nodes.values().any(|n| n.parent_id == Some(id))
    }

    /// Every node whose nuid has this node's nuid as a strict prefix
    pub fn descendants(&self, id: NodeId) -> Vec<&TreeNode> {
        let Some(ancestor) = self.node(id) else {
            return Vec::new();
        };
        let mut found: Vec<&TreeNode> = self
            .nodes
            .values()
            .filter(|n| NuidManager::is_descendant(&n.nuid, &ancestor.nuid))
            .collect();
        found.sort_by(|a, b| a.nuid.cmp(&b.nuid));
        found
    }

    /// Nodes on the path from the root down to the node's parent, root first
    pub fn ancestors(&self, id: NodeId) -> Vec<&TreeNode> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let mut chain: Vec<&TreeNode> = NuidManager::ancestor_nuids(&node.nuid)
            .into_iter()
            .filter_map(|nuid| self.node_by_nuid(nuid))
            .collect();
        chain.reverse();
        chain
    }

    // ---- crosslinks --------------------------------------------------------

    pub fn crosslinks_from(&self, parent_id: NodeId) -> impl Iterator<Item = &Crosslink> {
        self.crosslinks
            .values()
            .filter(move |c| c.parent_id == parent_id)
    }

    pub fn crosslinks_to(&self, child_id: NodeId) -> impl Iterator<Item = &Crosslink> {
        self.crosslinks
            .values()
            .filter(move |c| c.child_id == child_id)
    }

    pub fn crosslink_between(&self, parent_id: NodeId, child_id: NodeId) -> Option<&Crosslink> {
        self.crosslinks
            .values()
            .find(|c| c.connects(parent_id, child_id))
    }

    /// All crosslinks as nuid pairs, in creation order
    pub fn crosslink_pairs(&self) -> Vec<NuidPair> {
        self.crosslinks
            .values()
            .filter_map(|c| {
                let parent = self.node(c.parent_id)?;
                let child = self.node(c.child_id)?;
                Some((parent.nuid.clone(), child.nuid.clone()))
            })
            .collect()
    }

    /// Tree children and crosslinked children, merged by position
    pub fn effective_children(&self, id: NodeId) -> Vec<EffectiveChild<'_>> {
        let mut children: Vec<EffectiveChild<'_>> = self
            .tree_children(id)
            .into_iter()
            .map(|node| EffectiveChild {
                node,
                crosslink: None,
            })
            .collect();

        children.extend(self.crosslinks_from(id).filter_map(|link| {
            self.node(link.child_id).map(|node| EffectiveChild {
                node,
                crosslink: Some(link),
            })
        }));

        children.sort_by(|a, b| (a.position(), &a.node.nuid).cmp(&(b.position(), &b.node.nuid)));
        children
    }

    pub fn effective_child(&self, parent_id: NodeId, child_id: NodeId) -> Option<EffectiveChild<'_>> {
        self.effective_children(parent_id)
            .into_iter()
            .find(|c| c.node.id == child_id)
    }

    /// Parents that show `child_id`: its tree parent and every crosslink parent
    pub fn parents_showing(&self, child_id: NodeId) -> Vec<NodeId> {
        let mut parents: Vec<NodeId> = self
            .node(child_id)
            .and_then(|n| n.parent_id)
            .into_iter()
            .collect();
        for link in self.crosslinks_to(child_id) {
            if !parents.contains(&link.parent_id) {
                parents.push(link.parent_id);
            }
        }
        parents
    }

    // ---- filters -----------------------------------------------------------

    pub fn matrix_filter(&self, uuid: &Uuid) -> Option<&MatrixFilter> {
        self.matrix_filters.get(uuid)
    }

    /// Filters owned by a node, ordered by position then name
    pub fn filters_of(&self, node_id: NodeId) -> Vec<&MatrixFilter> {
        let mut filters: Vec<&MatrixFilter> = self
            .matrix_filters
            .values()
            .filter(|f| f.node_id == node_id)
            .collect();
        filters.sort_by(|a, b| (a.position, &a.name).cmp(&(b.position, &b.name)));
        filters
    }

    /// Declared spaces of a filter, ordered by position then id
    pub fn spaces_of(&self, filter_uuid: &Uuid) -> Vec<&MatrixFilterSpace> {
        let mut spaces: Vec<&MatrixFilterSpace> = self
            .filter_spaces
            .values()
            .filter(|s| &s.matrix_filter_uuid == filter_uuid)
            .collect();
        spaces.sort_by_key(|s| (s.position, s.id));
        spaces
    }

    pub fn node_filter_space(&self, node_id: NodeId, filter_uuid: &Uuid) -> Option<&NodeFilterSpace> {
        self.node_filter_spaces
            .values()
            .find(|nfs| nfs.node_id == node_id && &nfs.matrix_filter_uuid == filter_uuid)
    }

    pub fn node_filter_spaces_of(&self, node_id: NodeId) -> impl Iterator<Item = &NodeFilterSpace> {
        self.node_filter_spaces
            .values()
            .filter(move |nfs| nfs.node_id == node_id)
    }

    pub fn children_cache(&self, parent_id: NodeId) -> Option<&ChildrenCache> {
        self.children_caches.get(&parent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;

    /// root(1) ─ a(2) ─ b(3)
    ///        └ c(4)
    fn sample_state() -> GuideState {
        let mut state = GuideState::new(1, "Guide");
        let specs: [(NodeId, &str, Option<NodeId>, u32); 4] = [
            (1, "001001", None, 1),
            (2, "001001001", Some(1), 2),
            (3, "001001001001", Some(2), 1),
            (4, "001001002", Some(1), 1),
        ];
        for (id, nuid, parent, position) in specs {
            state.meta_nodes.insert(
                id,
                MetaNode::new(id, Some(format!("n{}", id)), NodeType::Node),
            );
            state
                .nodes
                .insert(id, TreeNode::new(id, nuid.to_string(), parent, id, position));
        }
        state
    }

    #[test]
    fn test_tree_children_ordered_by_position() {
        let state = sample_state();
        let ids: Vec<NodeId> = state.tree_children(1).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[test]
    fn test_descendants_match_transitive_children() {
        let state = sample_state();
        let mut by_prefix: Vec<NodeId> = state.descendants(1).iter().map(|n| n.id).collect();
        by_prefix.sort();

        let mut transitive = Vec::new();
        let mut frontier = vec![1];
        while let Some(id) = frontier.pop() {
            for child in state.tree_children(id) {
                transitive.push(child.id);
                frontier.push(child.id);
            }
        }
        transitive.sort();

        assert_eq!(by_prefix, transitive);
        assert!(state.descendants(3).is_empty());
    }

    #[test]
    fn test_ancestors_root_first() {
        let state = sample_state();
        let ids: Vec<NodeId> = state.ancestors(3).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_effective_children_interleave_crosslinks() {
        let mut state = sample_state();
        let mut link = Crosslink::new(1, 1, 3, 2);
        link.decision_rule = Some("via link".to_string());
        state.crosslinks.insert(1, link);

        let children = state.effective_children(1);
        let ids: Vec<NodeId> = children.iter().map(|c| c.node.id).collect();
        // c(pos 1), then a(pos 2, nuid 001001001) before b(pos 2, longer nuid)
        assert_eq!(ids, vec![4, 2, 3]);
        assert_eq!(children[2].decision_rule(), Some("via link"));
        assert!(children[2].is_crosslink());
        assert_eq!(state.parents_showing(3), vec![2, 1]);
        assert_eq!(
            state.crosslink_pairs(),
            vec![("001001".to_string(), "001001001001".to_string())]
        );
    }
}
