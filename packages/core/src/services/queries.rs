//! Read-only guide queries
//!
//! Lookups used by taxon profiles, translation tooling and the release builder.
//! Result nodes without an assigned taxon stand for themselves: they are
//! reported with a taxon of the guide's own taxon source, named after the node.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::behaviors::{behavior_for, TaxonFilterBehavior};
use crate::config::GuideConfig;
use crate::db::GuideState;
use crate::models::{EncodedSpace, MatrixFilterType, NodeId, NodeTaxon, NodeType, TreeNode};

/// Values one node carries for one filter of its parent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeTrait {
    pub matrix_filter_uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub filter_type: MatrixFilterType,
    pub is_multispace: bool,
    pub values: Vec<Value>,
    /// Human readable form of every value
    pub display: Vec<String>,
}

/// Queries over one guide state
pub struct GuideQueries<'a> {
    state: &'a GuideState,
    config: &'a GuideConfig,
}

impl<'a> GuideQueries<'a> {
    pub fn new(state: &'a GuideState, config: &'a GuideConfig) -> Self {
        Self { state, config }
    }

    /// `{parent_nuid: [child_nuid, ..]}` over all crosslinks
    pub fn crosslink_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (parent, child) in self.state.crosslink_pairs() {
            map.entry(parent).or_default().push(child);
        }
        map
    }

    /// Nodes that may be crosslinked below `parent_id`
    ///
    /// Excludes the root, the parent with everything below it and nodes already
    /// linked below the parent.
    pub fn crosslink_candidates(&self, parent_id: NodeId) -> Vec<&'a TreeNode> {
        let state = self.state;
        let Some(parent) = state.node(parent_id) else {
            return Vec::new();
        };

        let mut candidates: Vec<&TreeNode> = state
            .nodes
            .values()
            .filter(|n| !n.is_root())
            .filter(|n| !n.nuid.starts_with(&parent.nuid))
            .filter(|n| state.crosslink_between(parent_id, n.id).is_none())
            .collect();
        candidates.sort_by(|a, b| a.nuid.cmp(&b.nuid));
        candidates
    }

    /// Taxon that stands for a node of this guide
    pub fn guide_taxon(&self, node: &TreeNode) -> NodeTaxon {
        let latname = self
            .state
            .meta_for(node)
            .and_then(|m| m.name.clone())
            .or_else(|| node.decision_rule.clone())
            .unwrap_or_default();
        NodeTaxon::new(
            self.config.guide_taxon_source.clone(),
            latname,
            None,
            node.name_uuid.to_string(),
            node.nuid.clone(),
        )
    }

    /// Assigned taxon, result nodes fall back to their guide taxon
    pub fn taxon_of(&self, node: &TreeNode) -> Option<NodeTaxon> {
        let meta = self.state.meta_for(node)?;
        match (&meta.taxon, meta.node_type) {
            (Some(taxon), _) => Some(taxon.clone()),
            (None, NodeType::Result) => Some(self.guide_taxon(node)),
            (None, _) => None,
        }
    }

    fn result_nodes(&self) -> impl Iterator<Item = &'a TreeNode> + 'a {
        let state = self.state;
        state
            .nodes
            .values()
            .filter(move |n| state.meta_for(n).is_some_and(|m| m.node_type == NodeType::Result))
    }

    /// Distinct taxa identified by this guide
    ///
    /// Assigned taxa are distinct by latname; results without a taxon appear
    /// with their guide taxon.
    pub fn taxa(&self) -> Vec<NodeTaxon> {
        let mut assigned: BTreeMap<String, NodeTaxon> = BTreeMap::new();
        let mut fallback = Vec::new();

        for node in self.result_nodes() {
            match self.state.meta_for(node).and_then(|m| m.taxon.as_ref()) {
                Some(taxon) => {
                    assigned
                        .entry(taxon.taxon_latname.clone())
                        .or_insert_with(|| taxon.clone());
                }
                None => fallback.push(self.guide_taxon(node)),
            }
        }

        let mut taxa: Vec<NodeTaxon> = assigned.into_values().collect();
        taxa.extend(fallback);
        taxa
    }

    /// Result nodes whose taxon is `taxon_latname` in `taxon_source`
    pub fn result_nodes_for_taxon(&self, taxon_source: &str, taxon_latname: &str) -> Vec<&'a TreeNode> {
        let mut found: Vec<&TreeNode> = self
            .result_nodes()
            .filter(|node| {
                self.taxon_of(node).is_some_and(|t| {
                    t.taxon_source == taxon_source && t.taxon_latname == taxon_latname
                })
            })
            .collect();
        found.sort_by_key(|n| n.id);
        found
    }

    fn traits_below_parent(&self, node: &TreeNode, parent_id: NodeId) -> Vec<NodeTrait> {
        let mut traits = Vec::new();
        for filter in self.state.filters_of(parent_id) {
            let behavior = behavior_for(filter.filter_type);

            let (values, display) = if filter.filter_type == MatrixFilterType::Taxon {
                let entries: Vec<Value> = self
                    .state
                    .spaces_of(&filter.uuid)
                    .first()
                    .map(|space| {
                        TaxonFilterBehavior::space_for_node(
                            &space.encoded_space,
                            self.taxon_of(node).as_ref(),
                        )
                    })
                    .unwrap_or_default();
                let display = entries
                    .iter()
                    .filter_map(|e| e.get("latname").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect();
                (entries, display)
            } else {
                let Some(node_space) = self.state.node_filter_space(node.id, &filter.uuid) else {
                    continue;
                };
                let values = behavior.node_filter_space_as_list(node_space, &self.state.filter_spaces);
                let display = match &node_space.encoded_space {
                    Some(encoded) => vec![behavior.decode_for_display(encoded)],
                    None => self
                        .state
                        .spaces_of(&filter.uuid)
                        .into_iter()
                        .filter(|s| node_space.values.contains(&s.id))
                        .map(|s| behavior.decode_for_display(&s.encoded_space))
                        .collect(),
                };
                (values, display)
            };

            if values.is_empty() {
                continue;
            }
            traits.push(NodeTrait {
                matrix_filter_uuid: filter.uuid,
                name: filter.name.clone(),
                description: filter.description.clone(),
                filter_type: filter.filter_type,
                is_multispace: behavior.is_multispace(),
                values,
                display,
            });
        }
        traits
    }

    /// Traits of a node and of every ancestor, nearest first
    ///
    /// Each node contributes the values it carries for the filters of its tree
    /// parent, so a result also shows what characterizes its higher groups.
    pub fn collect_traits(&self, node_id: NodeId) -> Vec<NodeTrait> {
        let Some(node) = self.state.node(node_id) else {
            return Vec::new();
        };

        let mut path: Vec<&TreeNode> = vec![node];
        path.extend(self.state.ancestors(node_id).into_iter().rev());

        path.into_iter()
            .filter_map(|n| n.parent_id.map(|parent_id| (n, parent_id)))
            .flat_map(|(n, parent_id)| self.traits_below_parent(n, parent_id))
            .collect()
    }

    /// Every translatable text of the guide, keyed by itself
    pub fn primary_localization(&self) -> BTreeMap<String, String> {
        let mut locale = BTreeMap::new();
        let mut add = |text: &str| {
            locale.insert(text.to_string(), text.to_string());
        };

        add(&self.state.guide_name);
        for meta in self.state.meta_nodes.values() {
            if let Some(name) = &meta.name {
                add(name);
            }
        }
        for node in self.state.nodes.values() {
            if let Some(rule) = &node.decision_rule {
                add(rule);
            }
        }
        for link in self.state.crosslinks.values() {
            if let Some(rule) = &link.decision_rule {
                add(rule);
            }
        }
        for filter in self.state.matrix_filters.values() {
            add(&filter.name);
            if let Some(description) = &filter.description {
                add(description);
            }
            if filter.filter_type == MatrixFilterType::DescriptiveTextAndImages {
                for space in self.state.spaces_of(&filter.uuid) {
                    if let EncodedSpace::Text(text) = &space.encoded_space {
                        add(text);
                    }
                }
            }
        }

        locale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetaNode;

    fn state_with_results() -> GuideState {
        let mut state = GuideState::new(1, "Guide");
        let beetle = NodeTaxon::new("col", "Carabus", None, "u-car", "001002004001");
        for (id, nuid, parent, name, node_type, taxon) in [
            (1, "001001", None, "Guide", NodeType::Root, None),
            (2, "001001001", Some(1), "Ground beetle", NodeType::Result, Some(beetle.clone())),
            (3, "001001002", Some(1), "Other beetle", NodeType::Result, Some(beetle)),
            (4, "001001003", Some(1), "Unknown bug", NodeType::Result, None),
        ] {
            let mut meta = MetaNode::new(id, Some(name.to_string()), node_type);
            meta.taxon = taxon;
            state.meta_nodes.insert(id, meta);
            state
                .nodes
                .insert(id, TreeNode::new(id, nuid.to_string(), parent, id, id as u32));
        }
        state
    }

    #[test]
    fn test_taxa_are_distinct_with_fallback() {
        let state = state_with_results();
        let config = GuideConfig::new(1, "Guide");
        let taxa = GuideQueries::new(&state, &config).taxa();

        assert_eq!(taxa.len(), 2);
        assert_eq!(taxa[0].taxon_latname, "Carabus");
        assert_eq!(taxa[1].taxon_latname, "Unknown bug");
        assert_eq!(taxa[1].taxon_source, config.guide_taxon_source);
        assert_eq!(taxa[1].taxon_nuid, "001001003");
    }

    #[test]
    fn test_result_nodes_for_taxon() {
        let state = state_with_results();
        let config = GuideConfig::new(1, "Guide");
        let queries = GuideQueries::new(&state, &config);

        let ids: Vec<NodeId> = queries
            .result_nodes_for_taxon("col", "Carabus")
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![2, 3]);

        let own = queries.result_nodes_for_taxon(&config.guide_taxon_source, "Unknown bug");
        assert_eq!(own.len(), 1);
        assert!(queries.result_nodes_for_taxon("col", "Apis").is_empty());
    }

    #[test]
    fn test_crosslink_candidates_exclude_own_branch() {
        let state = state_with_results();
        let config = GuideConfig::new(1, "Guide");
        let queries = GuideQueries::new(&state, &config);

        let ids: Vec<NodeId> = queries.crosslink_candidates(2).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert!(queries.crosslink_candidates(1).is_empty());
    }
}
