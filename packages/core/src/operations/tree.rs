//! Tree operations: insert, update, reorder, move and delete nodes

use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use super::{normalize_text, GuideTransaction, InsertNodeParams, NodeUpdate};
use crate::db::{DomainEvent, NuidManager};
use crate::models::{check_length, MetaNode, NodeId, NodeType, NuidPair, TreeNode, ValidationError};
use crate::services::{CrosslinkManager, KeyServiceError};

impl<'a> GuideTransaction<'a> {
    /// Create the root node of an empty guide
    pub fn create_root(&mut self) -> Result<TreeNode, KeyServiceError> {
        if self.state.root().is_some() {
            return Err(KeyServiceError::hierarchy_violation(
                "guide already has a root node",
            ));
        }

        let nuid = NuidManager::root_nuid(self.state.guide_id)?;
        let meta_id = self.state.sequences.next_meta_node();
        let id = self.state.sequences.next_node();
        let name = self.state.guide_name.clone();

        self.state
            .meta_nodes
            .insert(meta_id, MetaNode::new(meta_id, Some(name), NodeType::Root));
        let node = TreeNode::new(id, nuid.clone(), None, meta_id, 1);
        self.state.nodes.insert(id, node.clone());

        info!(id, %nuid, "Created root node");
        self.emit(DomainEvent::NodeCreated { id, nuid });
        Ok(node)
    }

    fn check_name(&self, name: &str, own_meta: Option<u64>) -> Result<(), KeyServiceError> {
        check_length("name", name, self.config.text_limits.meta_node_name)?;
        let taken = self
            .state
            .meta_nodes
            .values()
            .any(|m| Some(m.id) != own_meta && m.name.as_deref() == Some(name));
        if taken {
            return Err(ValidationError::DuplicateName(name.to_string()).into());
        }
        Ok(())
    }

    /// Insert a node below `params.parent_id`
    pub fn insert_node(&mut self, params: InsertNodeParams) -> Result<TreeNode, KeyServiceError> {
        let parent = self.node(params.parent_id)?;

        if params.node_type == NodeType::Root {
            return Err(KeyServiceError::hierarchy_violation(
                "a guide has exactly one root node",
            ));
        }
        if !self.node_type_of(&parent).can_have_children() {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "result node {} cannot have children",
                parent.id
            )));
        }

        let name = normalize_text(params.name);
        let decision_rule = normalize_text(params.decision_rule);
        if name.is_none() && decision_rule.is_none() {
            return Err(ValidationError::missing_field("name or decision_rule").into());
        }
        if let Some(name) = &name {
            self.check_name(name, None)?;
        }
        if let Some(rule) = &decision_rule {
            check_length("decision_rule", rule, self.config.text_limits.decision_rule)?;
        }

        let nuid = NuidManager::next_child_nuid(
            &parent.nuid,
            self.state
                .tree_children(parent.id)
                .into_iter()
                .map(|n| n.nuid.as_str()),
        )?;
        let position = params
            .position
            .unwrap_or(self.state.effective_children(parent.id).len() as u32 + 1);

        let meta_id = self.state.sequences.next_meta_node();
        let mut meta = MetaNode::new(meta_id, name, params.node_type);
        meta.taxon = params.taxon;
        meta.image_url = params.image_url;
        self.state.meta_nodes.insert(meta_id, meta);

        let id = self.state.sequences.next_node();
        let mut node = TreeNode::new(id, nuid.clone(), Some(parent.id), meta_id, position);
        node.decision_rule = decision_rule;
        self.state.nodes.insert(id, node.clone());

        self.cache().add_or_update_child(parent.id, id);

        info!(id, parent_id = parent.id, %nuid, "Inserted node");
        self.emit(DomainEvent::NodeCreated { id, nuid });
        Ok(node)
    }

    /// Change name, decision rule, taxon or image of a node
    pub fn update_node(&mut self, id: NodeId, update: NodeUpdate) -> Result<TreeNode, KeyServiceError> {
        let mut node = self.node(id)?;
        let mut meta = self.meta_of(&node)?;

        if let Some(name) = update.name {
            let name = normalize_text(name);
            if let Some(name) = &name {
                self.check_name(name, Some(meta.id))?;
            }
            meta.name = name;
        }
        if let Some(rule) = update.decision_rule {
            let rule = normalize_text(rule);
            if let Some(rule) = &rule {
                check_length("decision_rule", rule, self.config.text_limits.decision_rule)?;
            }
            node.decision_rule = rule;
        }
        if let Some(taxon) = update.taxon {
            meta.taxon = taxon;
        }
        if let Some(image_url) = update.image_url {
            meta.image_url = image_url;
        }

        if !node.is_root() && meta.name.is_none() && node.decision_rule.is_none() {
            return Err(ValidationError::missing_field("name or decision_rule").into());
        }

        node.touch();
        self.state.meta_nodes.insert(meta.id, meta);
        self.state.nodes.insert(id, node.clone());
        self.refresh_in_parents(id);

        self.emit(DomainEvent::NodeUpdated { id });
        Ok(node)
    }

    /// Assign positions 1..n to the effective children of `parent_id`
    ///
    /// `ordered` must list every effective child exactly once.
    pub fn reorder_children(&mut self, parent_id: NodeId, ordered: &[NodeId]) -> Result<(), KeyServiceError> {
        self.node(parent_id)?;

        let current: BTreeSet<NodeId> = self
            .state
            .effective_children(parent_id)
            .iter()
            .map(|c| c.node.id)
            .collect();
        let requested: BTreeSet<NodeId> = ordered.iter().copied().collect();
        if requested.len() != ordered.len() || requested != current {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "reorder of node {} must list each child exactly once",
                parent_id
            )));
        }

        for (index, child_id) in ordered.iter().enumerate() {
            let position = index as u32 + 1;
            let link_id = self
                .state
                .crosslink_between(parent_id, *child_id)
                .map(|link| link.id);
            match link_id {
                Some(link_id) => {
                    if let Some(link) = self.state.crosslinks.get_mut(&link_id) {
                        link.position = position;
                    }
                }
                None => {
                    if let Some(node) = self.state.nodes.get_mut(child_id) {
                        node.position = position;
                    }
                }
            }
        }

        self.cache().reorder(parent_id);
        self.emit(DomainEvent::ChildrenReordered { parent_id });
        Ok(())
    }

    /// Move a node with its subtree below `new_parent_id`
    ///
    /// Rewrites the nuid of the node and every descendant. Rejected for the root,
    /// for moves below the node itself or its descendants, below result nodes,
    /// and when the crosslinks re-expressed with the new nuids would be circular.
    pub fn move_node(&mut self, id: NodeId, new_parent_id: NodeId) -> Result<TreeNode, KeyServiceError> {
        let node = self.node(id)?;
        let new_parent = self.node(new_parent_id)?;

        let Some(old_parent_id) = node.parent_id else {
            return Err(KeyServiceError::hierarchy_violation(
                "the root node cannot be moved",
            ));
        };
        if new_parent_id == id {
            return Err(KeyServiceError::hierarchy_violation(
                "a node cannot be moved below itself",
            ));
        }
        if new_parent.is_descendant_of(&node) {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "node {} lies below node {}",
                new_parent_id, id
            )));
        }
        if !self.node_type_of(&new_parent).can_have_children() {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "result node {} cannot have children",
                new_parent_id
            )));
        }
        if new_parent_id == old_parent_id {
            return Ok(node);
        }
        if self.state.crosslink_between(new_parent_id, id).is_some() {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "node {} is already crosslinked below node {}",
                id, new_parent_id
            )));
        }

        let old_nuid = node.nuid.clone();
        let new_nuid = NuidManager::next_child_nuid(
            &new_parent.nuid,
            self.state
                .tree_children(new_parent_id)
                .into_iter()
                .map(|n| n.nuid.as_str()),
        )?;

        let mut rebased: BTreeMap<NodeId, String> = BTreeMap::new();
        rebased.insert(id, new_nuid.clone());
        for descendant in self.state.descendants(id) {
            rebased.insert(
                descendant.id,
                NuidManager::rebase(&descendant.nuid, &old_nuid, &new_nuid)?,
            );
        }

        let pairs: Vec<NuidPair> = self
            .state
            .crosslinks
            .values()
            .filter_map(|link| {
                let nuid_of = |node_id: NodeId| {
                    rebased
                        .get(&node_id)
                        .cloned()
                        .or_else(|| self.state.node(node_id).map(|n| n.nuid.clone()))
                };
                Some((nuid_of(link.parent_id)?, nuid_of(link.child_id)?))
            })
            .collect();
        if CrosslinkManager::check_circularity(&pairs) {
            return Err(KeyServiceError::circular_connection(format!(
                "moving node {} below node {}",
                id, new_parent_id
            )));
        }

        let position = self.state.effective_children(new_parent_id).len() as u32 + 1;
        for (node_id, nuid) in &rebased {
            if let Some(moved) = self.state.nodes.get_mut(node_id) {
                moved.nuid = nuid.clone();
            }
        }
        if let Some(moved) = self.state.nodes.get_mut(&id) {
            moved.parent_id = Some(new_parent_id);
            moved.position = position;
            moved.touch();
        }

        // ties between equal positions follow nuids, which just changed
        let mut resort: BTreeSet<NodeId> = rebased.keys().copied().collect();
        for node_id in rebased.keys() {
            resort.extend(self.state.crosslinks_to(*node_id).map(|l| l.parent_id));
        }

        let mut cache = self.cache();
        cache.remove_child(old_parent_id, &node.name_uuid);
        cache.add_or_update_child(new_parent_id, id);
        for parent_id in resort {
            cache.reorder(parent_id);
        }

        info!(id, %old_nuid, %new_nuid, "Moved node");
        self.emit(DomainEvent::NodeMoved {
            id,
            old_nuid,
            new_nuid,
        });
        self.node(id)
    }

    /// Delete a node without tree children
    ///
    /// Removes the node's crosslinks, the filters it owns with their spaces and
    /// assignments, its own assignments, its cache document and its entry in
    /// every parent's cache. The meta node goes with its last tree node.
    pub fn delete_node(&mut self, id: NodeId) -> Result<(), KeyServiceError> {
        let node = self.node(id)?;
        if node.is_root() {
            return Err(KeyServiceError::hierarchy_violation(
                "the root node cannot be deleted",
            ));
        }
        if self.state.has_tree_children(id) {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "node {} still has children",
                id
            )));
        }

        if let Some(parent_id) = node.parent_id {
            self.cache().remove_child(parent_id, &node.name_uuid);
        }

        let links: Vec<(u64, NodeId, NodeId)> = self
            .state
            .crosslinks
            .values()
            .filter(|l| l.touches(id))
            .map(|l| (l.id, l.parent_id, l.child_id))
            .collect();
        for (link_id, parent_id, child_id) in links {
            self.state.crosslinks.remove(&link_id);
            if child_id == id {
                self.cache().remove_child(parent_id, &node.name_uuid);
            }
            self.emit(DomainEvent::CrosslinkDeleted { id: link_id });
        }

        let owned: Vec<_> = self.state.filters_of(id).into_iter().map(|f| f.uuid).collect();
        for uuid in owned {
            self.state.matrix_filters.remove(&uuid);
            self.state
                .filter_spaces
                .retain(|_, space| space.matrix_filter_uuid != uuid);
            self.state
                .node_filter_spaces
                .retain(|_, nfs| nfs.matrix_filter_uuid != uuid);
            self.emit(DomainEvent::MatrixFilterDeleted { uuid });
        }
        self.state.node_filter_spaces.retain(|_, nfs| nfs.node_id != id);
        self.state.children_caches.remove(&id);

        self.state.nodes.remove(&id);
        if self.state.meta_node_references(node.meta_node_id) == 0 {
            self.state.meta_nodes.remove(&node.meta_node_id);
        }

        info!(id, nuid = %node.nuid, "Deleted node");
        self.emit(DomainEvent::NodeDeleted { id });
        Ok(())
    }

    /// Delete a node and its subtree, deepest nodes first
    ///
    /// Returns the deleted ids in deletion order.
    pub fn delete_branch(&mut self, id: NodeId) -> Result<Vec<NodeId>, KeyServiceError> {
        let node = self.node(id)?;
        if node.is_root() {
            return Err(KeyServiceError::hierarchy_violation(
                "the root node cannot be deleted",
            ));
        }

        let mut doomed: Vec<(usize, String, NodeId)> = self
            .state
            .descendants(id)
            .into_iter()
            .map(|n| (n.depth(), n.nuid.clone(), n.id))
            .collect();
        doomed.sort_by(|a, b| b.cmp(a));
        doomed.push((node.depth(), node.nuid.clone(), id));

        let mut deleted = Vec::with_capacity(doomed.len());
        for (_, _, node_id) in doomed {
            self.delete_node(node_id)?;
            deleted.push(node_id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::super::CrosslinkParams;
    use super::*;
    use crate::behaviors::StaticTaxonomySource;
    use crate::config::GuideConfig;
    use crate::db::GuideState;
    use crate::services::ChildrenCacheManager;

    fn with_tx<T>(
        state: &mut GuideState,
        op: impl FnOnce(&mut GuideTransaction<'_>) -> Result<T, KeyServiceError>,
    ) -> Result<T, KeyServiceError> {
        let config = GuideConfig::new(1, "Guide");
        let taxonomy = StaticTaxonomySource::new();
        let mut tx = GuideTransaction::new(state, &config, &taxonomy);
        op(&mut tx)
    }

    fn guide() -> GuideState {
        let mut state = GuideState::new(1, "Guide");
        with_tx(&mut state, |tx| tx.create_root()).unwrap();
        state
    }

    fn insert(state: &mut GuideState, parent: NodeId, name: &str, node_type: NodeType) -> TreeNode {
        with_tx(state, |tx| {
            tx.insert_node(InsertNodeParams::new(parent, node_type, name))
        })
        .unwrap()
    }

    #[test]
    fn test_insert_allocates_child_nuids() {
        let mut state = guide();
        let a = insert(&mut state, 1, "A", NodeType::Node);
        let b = insert(&mut state, 1, "B", NodeType::Node);
        let c = insert(&mut state, a.id, "C", NodeType::Result);

        assert_eq!(a.nuid, "001001001");
        assert_eq!(b.nuid, "001001002");
        assert_eq!(c.nuid, "001001001001");
        assert_eq!((a.position, b.position), (1, 2));
        assert_eq!(state.children_cache(1).unwrap().items.len(), 2);
    }

    #[test]
    fn test_insert_rejections() {
        let mut state = guide();
        let leaf = insert(&mut state, 1, "Leaf", NodeType::Result);

        let below_result = with_tx(&mut state, |tx| {
            tx.insert_node(InsertNodeParams::new(leaf.id, NodeType::Node, "X"))
        });
        assert!(below_result.unwrap_err().is_hierarchy_violation());

        let nameless = with_tx(&mut state, |tx| {
            tx.insert_node(InsertNodeParams::new(1, NodeType::Node, "  "))
        });
        assert!(matches!(
            nameless,
            Err(KeyServiceError::ValidationFailed(ValidationError::MissingField(_)))
        ));

        let duplicate = with_tx(&mut state, |tx| {
            tx.insert_node(InsertNodeParams::new(1, NodeType::Node, "Leaf"))
        });
        assert!(matches!(
            duplicate,
            Err(KeyServiceError::ValidationFailed(ValidationError::DuplicateName(_)))
        ));
    }

    #[test]
    fn test_decision_rule_alone_is_enough() {
        let mut state = guide();
        let node = with_tx(&mut state, |tx| {
            let mut params = InsertNodeParams::new(1, NodeType::Node, "");
            params.name = None;
            tx.insert_node(params.with_decision_rule("wings present"))
        })
        .unwrap();
        assert_eq!(node.decision_rule.as_deref(), Some("wings present"));
    }

    #[test]
    fn test_move_rewrites_subtree_nuids() {
        let mut state = guide();
        let a = insert(&mut state, 1, "A", NodeType::Node);
        let b = insert(&mut state, 1, "B", NodeType::Node);
        let a1 = insert(&mut state, a.id, "A1", NodeType::Node);
        let a11 = insert(&mut state, a1.id, "A11", NodeType::Result);

        let moved = with_tx(&mut state, |tx| tx.move_node(a.id, b.id)).unwrap();
        assert_eq!(moved.nuid, "001001002001");
        assert_eq!(state.node(a1.id).unwrap().nuid, "001001002001001");
        assert_eq!(state.node(a11.id).unwrap().nuid, "001001002001001001");
        assert!(state.children_cache(1).unwrap().item(&a.name_uuid).is_none());
        assert!(state.children_cache(b.id).unwrap().item(&a.name_uuid).is_some());

        assert!(ChildrenCacheManager::new(&mut state).rebuild_all().is_empty());
    }

    #[test]
    fn test_move_rejections() {
        let mut state = guide();
        let a = insert(&mut state, 1, "A", NodeType::Node);
        let a1 = insert(&mut state, a.id, "A1", NodeType::Node);

        for target in [a.id, a1.id] {
            let err = with_tx(&mut state, |tx| tx.move_node(a.id, target)).unwrap_err();
            assert!(err.is_hierarchy_violation());
        }
        let err = with_tx(&mut state, |tx| tx.move_node(1, a.id)).unwrap_err();
        assert!(err.is_hierarchy_violation());
    }

    #[test]
    fn test_move_rechecks_crosslinks() {
        let mut state = guide();
        let a = insert(&mut state, 1, "A", NodeType::Node);
        let c = insert(&mut state, 1, "C", NodeType::Node);
        // C shows A; moving C below A closes the loop A → C → A
        with_tx(&mut state, |tx| tx.add_crosslink(c.id, CrosslinkParams::new(a.id))).unwrap();

        let err = with_tx(&mut state, |tx| tx.move_node(c.id, a.id)).unwrap_err();
        assert!(err.is_circular_connection());
    }

    #[test]
    fn test_delete_requires_leaf() {
        let mut state = guide();
        let a = insert(&mut state, 1, "Group", NodeType::Node);
        let b = insert(&mut state, a.id, "Leaf", NodeType::Result);

        let err = with_tx(&mut state, |tx| tx.delete_node(a.id)).unwrap_err();
        assert!(err.is_hierarchy_violation());

        let deleted = with_tx(&mut state, |tx| tx.delete_branch(a.id)).unwrap();
        assert_eq!(deleted, vec![b.id, a.id]);
        assert_eq!(state.nodes.len(), 1);
        assert_eq!(state.meta_nodes.len(), 1);
        assert!(state.children_cache(1).unwrap().items.is_empty());
        assert!(with_tx(&mut state, |tx| tx.delete_node(1)).is_err());
    }

    #[test]
    fn test_reorder_children() {
        let mut state = guide();
        let a = insert(&mut state, 1, "A", NodeType::Node);
        let b = insert(&mut state, 1, "B", NodeType::Node);
        let c = insert(&mut state, a.id, "C", NodeType::Result);
        with_tx(&mut state, |tx| tx.add_crosslink(1, CrosslinkParams::new(c.id))).unwrap();

        with_tx(&mut state, |tx| tx.reorder_children(1, &[c.id, b.id, a.id])).unwrap();
        let order: Vec<NodeId> = state
            .children_cache(1)
            .unwrap()
            .items
            .iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(order, vec![c.id, b.id, a.id]);

        let err = with_tx(&mut state, |tx| tx.reorder_children(1, &[a.id, b.id])).unwrap_err();
        assert!(err.is_hierarchy_violation());
    }
}
