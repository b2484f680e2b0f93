//! Release export
//!
//! Renders a guide into the JSON document consumed by the offline identification
//! app. Every parent (root and inner nodes) becomes one entry of `tree`, keyed by
//! its `name_uuid`, carrying its children as rendered in its children cache and
//! the definitions of its matrix filters.
//!
//! Taxon filters have no stored assignments; a child's values for them are derived
//! from its taxon at export time. Result nodes without a taxon are exported with
//! their guide taxon.
//!
//! The builder reads caches as they are. Callers export from a state whose caches
//! were rebuilt, see
//! [`NatureGuideService::build_release`](crate::services::NatureGuideService::build_release).

use serde_json::{json, Map, Value};

use crate::behaviors::{behavior_for, TaxonFilterBehavior};
use crate::config::GuideConfig;
use crate::db::GuideState;
use crate::models::{CacheItem, MatrixFilter, MatrixFilterType, NodeId, TreeNode};
use crate::services::{ChildrenCacheManager, GuideQueries};

pub struct ReleaseBuilder<'a> {
    state: &'a GuideState,
    config: &'a GuideConfig,
    queries: GuideQueries<'a>,
}

impl<'a> ReleaseBuilder<'a> {
    pub fn new(state: &'a GuideState, config: &'a GuideConfig) -> Self {
        Self {
            state,
            config,
            queries: GuideQueries::new(state, config),
        }
    }

    /// The complete release document
    pub fn build(&self) -> Value {
        let mut tree = Map::new();
        for node in self.state.nodes.values() {
            let is_parent = self
                .state
                .meta_for(node)
                .map_or(true, |m| m.node_type.can_have_children());
            if is_parent {
                tree.insert(node.name_uuid.to_string(), self.parent_json(node));
            }
        }

        json!({
            "guide_id": self.state.guide_id,
            "name": self.state.guide_name,
            "start_node_uuid": self.state.root().map(|r| r.name_uuid.to_string()),
            "tree": tree,
            "crosslinks": self.queries.crosslink_map(),
            "taxon_source": self.config.guide_taxon_source,
        })
    }

    fn parent_json(&self, node: &TreeNode) -> Value {
        let cache = self
            .state
            .children_cache(node.id)
            .cloned()
            .unwrap_or_else(|| ChildrenCacheManager::compute(self.state, node.id));

        let filters = self.state.filters_of(node.id);
        let children: Vec<Value> = cache
            .items
            .iter()
            .map(|item| self.child_json(item, &filters))
            .collect();

        let children_count = children.len();

        let mut matrix_filters = Map::new();
        for filter in &filters {
            matrix_filters.insert(filter.uuid_key(), self.filter_json(filter));
        }

        json!({
            "uuid": node.name_uuid.to_string(),
            "nuid": node.nuid,
            "name": self.name_of(node),
            "taxon": self.queries.taxon_of(node).map(|t| t.as_json()),
            "children": children,
            "children_count": children_count,
            "matrix_filters": matrix_filters,
        })
    }

    fn child_json(&self, item: &CacheItem, filters: &[&MatrixFilter]) -> Value {
        let node = self.state.node(item.id);
        let taxon = match (&item.taxon, node) {
            (Some(taxon), _) => Some(taxon.clone()),
            (None, Some(node)) => self.queries.taxon_of(node),
            (None, None) => None,
        };

        let mut space: Map<String, Value> = item
            .space
            .iter()
            .map(|(uuid, values)| (uuid.clone(), json!(values)))
            .collect();
        for filter in filters.iter().filter(|f| f.filter_type == MatrixFilterType::Taxon) {
            let derived = self
                .state
                .spaces_of(&filter.uuid)
                .first()
                .map(|s| TaxonFilterBehavior::space_for_node(&s.encoded_space, taxon.as_ref()))
                .unwrap_or_default();
            if !derived.is_empty() {
                space.insert(filter.uuid_key(), Value::Array(derived));
            }
        }

        json!({
            "id": item.id,
            "meta_node_id": item.meta_node_id,
            "uuid": item.uuid.to_string(),
            "nuid": node.map(|n| n.nuid.clone()),
            "name": item.name,
            "node_type": item.node_type.as_str(),
            "decision_rule": item.decision_rule,
            "image_url": item.image_url,
            "is_visible": item.is_visible,
            "taxon": taxon.map(|t| t.as_json()),
            "space": space,
            "children_count": self.children_count(item.id),
        })
    }

    fn filter_json(&self, filter: &MatrixFilter) -> Value {
        let behavior = behavior_for(filter.filter_type);
        let spaces = self.state.spaces_of(&filter.uuid);

        let mut rendered = json!({
            "uuid": filter.uuid_key(),
            "name": filter.name,
            "type": filter.filter_type.as_str(),
            "position": filter.position,
            "description": filter.description,
            "weight": filter.weight,
            "allow_multiple_values": filter.definition.allow_multiple_values,
            "definition": filter.definition.to_value(),
        });

        if behavior.is_multispace() {
            let values: Vec<Value> = spaces
                .iter()
                .map(|s| {
                    json!({
                        "space_id": s.id,
                        "encoded_space": s.encoded_space.to_value(),
                        "display": behavior.decode_for_display(&s.encoded_space),
                        "image_url": s.image_url,
                        "description": s.description,
                        "gradient": s.gradient,
                    })
                })
                .collect();
            rendered["space"] = Value::Array(values);
        } else {
            rendered["encoded_space"] = spaces
                .first()
                .map(|s| s.encoded_space.to_value())
                .unwrap_or_else(|| behavior.get_empty_encoded_space());
        }

        rendered
    }

    fn name_of(&self, node: &TreeNode) -> Option<String> {
        self.state.meta_for(node).and_then(|m| m.name.clone())
    }

    fn children_count(&self, node_id: NodeId) -> usize {
        self.state.effective_children(node_id).len()
    }
}

/// Release document of `state`, rendered from its current caches
pub fn build_release_json(state: &GuideState, config: &GuideConfig) -> Value {
    ReleaseBuilder::new(state, config).build()
}

/// Parents whose stored cache differs from the one computed from relational state
pub fn drifted_parents(state: &GuideState) -> Vec<NodeId> {
    state
        .nodes
        .keys()
        .copied()
        .filter(|&id| {
            let computed = ChildrenCacheManager::compute(state, id);
            state.children_cache(id).cloned().unwrap_or_default() != computed
        })
        .collect()
}
