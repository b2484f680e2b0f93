//! Guide Operations
//!
//! Every mutation of a guide runs on a [`GuideTransaction`]: a mutable borrow of a
//! working copy of the [`GuideState`] plus the events collected so far. The
//! service clones the committed state, runs one operation on the clone, persists
//! it and only then swaps it in, so an operation that returns an error leaves
//! nothing behind and may bail out at any point.
//!
//! Each operation performs its children cache updates itself, within the same
//! transaction as the relational change.
//!
//! Operations are grouped by concern:
//!
//! - [`tree`] - insert, update, reorder, move and delete nodes
//! - [`crosslinks`] - add and remove crosslinks
//! - [`filters`] - matrix filters, their spaces and node assignments

pub mod crosslinks;
pub mod filters;
pub mod tree;

use serde_json::Value;
use uuid::Uuid;

use crate::behaviors::{SpaceInput, TaxonomySource};
use crate::config::GuideConfig;
use crate::db::{DomainEvent, GuideState};
use crate::models::{
    FilterDefinition, MatrixFilter, MatrixFilterSpace, MatrixFilterType, MetaNode, NodeId,
    NodeTaxon, NodeType, SpaceId, TreeNode,
};
use crate::services::{ChildrenCacheManager, KeyServiceError};

/// Parameters for inserting a node below a parent
#[derive(Debug, Clone)]
pub struct InsertNodeParams {
    pub parent_id: NodeId,
    pub node_type: NodeType,
    pub name: Option<String>,
    pub decision_rule: Option<String>,
    pub taxon: Option<NodeTaxon>,
    pub image_url: Option<String>,
    /// Sibling position, appended after the existing children if `None`
    pub position: Option<u32>,
}

impl InsertNodeParams {
    pub fn new(parent_id: NodeId, node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            parent_id,
            node_type,
            name: Some(name.into()),
            decision_rule: None,
            taxon: None,
            image_url: None,
            position: None,
        }
    }

    pub fn with_decision_rule(mut self, decision_rule: impl Into<String>) -> Self {
        self.decision_rule = Some(decision_rule.into());
        self
    }

    pub fn with_taxon(mut self, taxon: NodeTaxon) -> Self {
        self.taxon = Some(taxon);
        self
    }
}

/// Partial node update, `None` leaves a field unchanged
///
/// The nested options clear a field with `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub name: Option<Option<String>>,
    pub decision_rule: Option<Option<String>>,
    pub taxon: Option<Option<NodeTaxon>>,
    pub image_url: Option<Option<String>>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Some(name.into()));
        self
    }

    pub fn with_decision_rule(mut self, decision_rule: Option<String>) -> Self {
        self.decision_rule = Some(decision_rule);
        self
    }

    pub fn with_taxon(mut self, taxon: Option<NodeTaxon>) -> Self {
        self.taxon = Some(taxon);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.decision_rule.is_none()
            && self.taxon.is_none()
            && self.image_url.is_none()
    }
}

/// One crosslink to create below a parent
#[derive(Debug, Clone)]
pub struct CrosslinkParams {
    pub child_id: NodeId,
    pub decision_rule: Option<String>,
    pub position: Option<u32>,
}

impl CrosslinkParams {
    pub fn new(child_id: NodeId) -> Self {
        Self {
            child_id,
            decision_rule: None,
            position: None,
        }
    }

    pub fn with_decision_rule(mut self, decision_rule: impl Into<String>) -> Self {
        self.decision_rule = Some(decision_rule.into());
        self
    }
}

/// Parameters for creating a matrix filter
#[derive(Debug, Clone)]
pub struct MatrixFilterParams {
    pub node_id: NodeId,
    pub filter_type: MatrixFilterType,
    pub name: String,
    pub description: Option<String>,
    /// Falls back to the type's default definition
    pub definition: Option<FilterDefinition>,
    pub weight: Option<u8>,
    pub position: Option<u32>,
}

impl MatrixFilterParams {
    pub fn new(node_id: NodeId, filter_type: MatrixFilterType, name: impl Into<String>) -> Self {
        Self {
            node_id,
            filter_type,
            name: name.into(),
            description: None,
            definition: None,
            weight: None,
            position: None,
        }
    }

    pub fn with_definition(mut self, definition: FilterDefinition) -> Self {
        self.definition = Some(definition);
        self
    }
}

/// Partial matrix filter update; the filter type never changes
#[derive(Debug, Clone, Default)]
pub struct MatrixFilterUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub definition: Option<FilterDefinition>,
    pub weight: Option<u8>,
    pub position: Option<u32>,
}

/// One declared value of a multispace filter
#[derive(Debug, Clone)]
pub struct FilterSpaceParams {
    pub input: SpaceInput,
    pub image_url: Option<String>,
    /// Color name or similar
    pub description: Option<String>,
    pub gradient: bool,
}

impl FilterSpaceParams {
    pub fn new(input: SpaceInput) -> Self {
        Self {
            input,
            image_url: None,
            description: None,
            gradient: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Value(s) assigned to a child for one filter
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpaceAssignment {
    /// Raw value for Range and Number filters, e.g. `[1.5, 4]`
    Inline(Value),
    /// Declared spaces of a multispace filter
    Values(Vec<SpaceId>),
}

/// A unit of work over a working copy of the guide state
pub struct GuideTransaction<'a> {
    state: &'a mut GuideState,
    config: &'a GuideConfig,
    taxonomy: &'a dyn TaxonomySource,
    events: Vec<DomainEvent>,
}

impl<'a> GuideTransaction<'a> {
    pub fn new(
        state: &'a mut GuideState,
        config: &'a GuideConfig,
        taxonomy: &'a dyn TaxonomySource,
    ) -> Self {
        Self {
            state,
            config,
            taxonomy,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &GuideState {
        &*self.state
    }

    /// Events collected so far, to be emitted once the state is committed
    pub fn into_events(self) -> Vec<DomainEvent> {
        self.events
    }

    fn emit(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    fn cache(&mut self) -> ChildrenCacheManager<'_> {
        ChildrenCacheManager::new(&mut *self.state)
    }

    fn node(&self, id: NodeId) -> Result<TreeNode, KeyServiceError> {
        self.state
            .node(id)
            .cloned()
            .ok_or_else(|| KeyServiceError::node_not_found(id))
    }

    fn node_type_of(&self, node: &TreeNode) -> NodeType {
        self.state
            .meta_for(node)
            .map_or(NodeType::Node, |meta| meta.node_type)
    }

    fn meta_of(&self, node: &TreeNode) -> Result<MetaNode, KeyServiceError> {
        self.state.meta_for(node).cloned().ok_or_else(|| {
            KeyServiceError::hierarchy_violation(format!("node {} has no meta node", node.id))
        })
    }

    fn matrix_filter(&self, uuid: &Uuid) -> Result<MatrixFilter, KeyServiceError> {
        self.state
            .matrix_filter(uuid)
            .cloned()
            .ok_or_else(|| KeyServiceError::matrix_filter_not_found(uuid))
    }

    fn filter_space(&self, id: SpaceId) -> Result<MatrixFilterSpace, KeyServiceError> {
        self.state
            .filter_spaces
            .get(&id)
            .cloned()
            .ok_or_else(|| KeyServiceError::filter_space_not_found(id))
    }

    /// Recompute one parent's cache, returns whether it had drifted
    pub fn rebuild_children_cache(&mut self, parent_id: NodeId) -> Result<bool, KeyServiceError> {
        self.node(parent_id)?;
        let drifted = self.cache().rebuild(parent_id);
        if drifted {
            self.emit(DomainEvent::ChildrenCachesRebuilt {
                drifted: vec![parent_id],
            });
        }
        Ok(drifted)
    }

    /// Recompute every cache, returns the parents whose cache had drifted
    pub fn rebuild_all_children_caches(&mut self) -> Vec<NodeId> {
        let drifted = self.cache().rebuild_all();
        self.emit(DomainEvent::ChildrenCachesRebuilt {
            drifted: drifted.clone(),
        });
        drifted
    }

    /// Refresh the entry of `node_id` in every parent that shows it
    fn refresh_in_parents(&mut self, node_id: NodeId) {
        let parents = self.state.parents_showing(node_id);
        let mut cache = self.cache();
        for parent_id in parents {
            cache.add_or_update_child(parent_id, node_id);
        }
    }
}

/// Trimmed text, empty input counts as absent
pub(crate) fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
