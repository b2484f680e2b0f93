//! Crosslink operations

use std::collections::BTreeSet;
use tracing::info;

use super::{normalize_text, CrosslinkParams, GuideTransaction};
use crate::db::DomainEvent;
use crate::models::{check_length, Crosslink, CrosslinkId, NodeId, NuidPair};
use crate::services::{CrosslinkManager, KeyServiceError};

impl<'a> GuideTransaction<'a> {
    /// Show an existing node as an additional child of `parent_id`
    pub fn add_crosslink(
        &mut self,
        parent_id: NodeId,
        params: CrosslinkParams,
    ) -> Result<Crosslink, KeyServiceError> {
        let mut created = self.add_crosslinks(parent_id, vec![params])?;
        created
            .pop()
            .ok_or_else(|| KeyServiceError::hierarchy_violation("no crosslink was created"))
    }

    /// Crosslink several children below `parent_id`, all or nothing
    ///
    /// The cycle check runs once over the existing crosslinks plus the whole batch.
    pub fn add_crosslinks(
        &mut self,
        parent_id: NodeId,
        batch: Vec<CrosslinkParams>,
    ) -> Result<Vec<Crosslink>, KeyServiceError> {
        let parent = self.node(parent_id)?;
        if !self.node_type_of(&parent).can_have_children() {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "result node {} cannot have children",
                parent_id
            )));
        }

        let mut pairs: Vec<NuidPair> = self.state.crosslink_pairs();
        let mut seen = BTreeSet::new();
        for params in &batch {
            let child = self.node(params.child_id)?;
            if !seen.insert(child.id) || self.state.crosslink_between(parent_id, child.id).is_some() {
                return Err(KeyServiceError::hierarchy_violation(format!(
                    "node {} is already crosslinked below node {}",
                    child.id, parent_id
                )));
            }
            if child.parent_id == Some(parent_id) {
                return Err(KeyServiceError::hierarchy_violation(format!(
                    "node {} already is a child of node {}",
                    child.id, parent_id
                )));
            }
            pairs.push((parent.nuid.clone(), child.nuid.clone()));
        }

        if CrosslinkManager::check_circularity(&pairs) {
            return Err(KeyServiceError::circular_connection(format!(
                "crosslinking below node {}",
                parent_id
            )));
        }

        let mut next_position = self.state.effective_children(parent_id).len() as u32 + 1;
        let mut created = Vec::with_capacity(batch.len());
        for params in batch {
            let decision_rule = normalize_text(params.decision_rule);
            if let Some(rule) = &decision_rule {
                check_length("decision_rule", rule, self.config.text_limits.decision_rule)?;
            }

            let id = self.state.sequences.next_crosslink();
            let position = params.position.unwrap_or(next_position);
            next_position += 1;

            let mut link = Crosslink::new(id, parent_id, params.child_id, position);
            link.decision_rule = decision_rule;
            self.state.crosslinks.insert(id, link.clone());
            self.cache().add_or_update_child(parent_id, params.child_id);

            info!(id, parent_id, child_id = params.child_id, "Added crosslink");
            self.emit(DomainEvent::CrosslinkCreated {
                id,
                parent_id,
                child_id: params.child_id,
            });
            created.push(link);
        }

        Ok(created)
    }

    /// Delete a crosslink, the child node stays where it is
    pub fn remove_crosslink(&mut self, id: CrosslinkId) -> Result<Crosslink, KeyServiceError> {
        let link = self
            .state
            .crosslinks
            .remove(&id)
            .ok_or_else(|| KeyServiceError::crosslink_not_found(id))?;

        if let Some(child_uuid) = self.state.node(link.child_id).map(|n| n.name_uuid) {
            self.cache().remove_child(link.parent_id, &child_uuid);
        }

        info!(id, parent_id = link.parent_id, child_id = link.child_id, "Removed crosslink");
        self.emit(DomainEvent::CrosslinkDeleted { id });
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::StaticTaxonomySource;
    use crate::config::GuideConfig;
    use crate::db::GuideState;
    use crate::models::NodeType;
    use crate::operations::InsertNodeParams;

    fn run<T>(
        state: &mut GuideState,
        op: impl FnOnce(&mut GuideTransaction<'_>) -> Result<T, KeyServiceError>,
    ) -> Result<T, KeyServiceError> {
        let config = GuideConfig::new(1, "Guide");
        let taxonomy = StaticTaxonomySource::new();
        let mut tx = GuideTransaction::new(state, &config, &taxonomy);
        op(&mut tx)
    }

    /// root(1) with siblings A(2), B(3) and A's child A1(4)
    fn guide() -> GuideState {
        let mut state = GuideState::new(1, "Guide");
        run(&mut state, |tx| {
            tx.create_root()?;
            let a = tx.insert_node(InsertNodeParams::new(1, NodeType::Node, "A"))?;
            tx.insert_node(InsertNodeParams::new(1, NodeType::Node, "B"))?;
            tx.insert_node(InsertNodeParams::new(a.id, NodeType::Result, "A1"))?;
            Ok(())
        })
        .unwrap();
        state
    }

    #[test]
    fn test_crosslink_uses_its_own_decision_rule() {
        let mut state = guide();
        run(&mut state, |tx| {
            tx.add_crosslink(3, CrosslinkParams::new(4).with_decision_rule("small"))
        })
        .unwrap();

        let uuid = state.node(4).unwrap().name_uuid;
        let item = state.children_cache(3).unwrap().item(&uuid).unwrap().clone();
        assert_eq!(item.decision_rule.as_deref(), Some("small"));
        assert_eq!(item.id, 4);
    }

    #[test]
    fn test_reverse_link_is_rejected_without_mutation() {
        let mut state = guide();
        run(&mut state, |tx| tx.add_crosslink(2, CrosslinkParams::new(3))).unwrap();

        let mut working = state.clone();
        let err = run(&mut working, |tx| tx.add_crosslink(3, CrosslinkParams::new(2))).unwrap_err();
        assert!(err.is_circular_connection());
        assert_eq!(state.crosslinks.len(), 1);
    }

    #[test]
    fn test_structural_rejections() {
        let mut state = guide();
        let into_result = run(&mut state, |tx| tx.add_crosslink(4, CrosslinkParams::new(3)));
        assert!(into_result.unwrap_err().is_hierarchy_violation());

        let tree_child = run(&mut state, |tx| tx.add_crosslink(2, CrosslinkParams::new(4)));
        assert!(tree_child.unwrap_err().is_hierarchy_violation());

        let to_self = run(&mut state, |tx| tx.add_crosslink(2, CrosslinkParams::new(2)));
        assert!(to_self.unwrap_err().is_circular_connection());

        let to_ancestor = run(&mut state, |tx| tx.add_crosslink(2, CrosslinkParams::new(1)));
        assert!(to_ancestor.unwrap_err().is_circular_connection());

        let duplicate = run(&mut state, |tx| {
            tx.add_crosslinks(3, vec![CrosslinkParams::new(4), CrosslinkParams::new(4)])
        });
        assert!(duplicate.unwrap_err().is_hierarchy_violation());
    }

    #[test]
    fn test_remove_crosslink_updates_parent_cache() {
        let mut state = guide();
        let link = run(&mut state, |tx| tx.add_crosslink(3, CrosslinkParams::new(4))).unwrap();
        run(&mut state, |tx| tx.remove_crosslink(link.id)).unwrap();

        assert!(state.crosslinks.is_empty());
        assert!(state.children_cache(3).unwrap().items.is_empty());
        assert!(state.node(4).is_some());
        assert!(run(&mut state, |tx| tx.remove_crosslink(link.id)).is_err());
    }
}
