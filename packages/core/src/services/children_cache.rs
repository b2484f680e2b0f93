//! Children Cache Manager
//!
//! Maintains one [`ChildrenCache`] document per parent node. Every mutation of
//! the relational state that changes what a parent shows for its children calls
//! one of the named operations below within the same unit of work.
//!
//! # Staleness
//!
//! Two operations only touch the filter type map and leave children's `space`
//! alone: adding a filter does not add empty entries and removing a filter does
//! not strip existing ones. [`ChildrenCacheManager::rebuild_all`] recomputes every
//! cache from the relational state and reports which parents had drifted.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

use crate::behaviors::behavior_for;
use crate::db::{EffectiveChild, GuideState};
use crate::models::{CacheItem, ChildrenCache, MatrixFilter, MatrixFilterSpace, NodeId};

/// Named cache operations over a guide state
pub struct ChildrenCacheManager<'a> {
    state: &'a mut GuideState,
}

impl<'a> ChildrenCacheManager<'a> {
    pub fn new(state: &'a mut GuideState) -> Self {
        Self { state }
    }

    /// Render the entry of one effective child below `parent_id`
    pub fn child_as_item(state: &GuideState, parent_id: NodeId, child: &EffectiveChild<'_>) -> CacheItem {
        let node = child.node;
        let meta = state.meta_for(node);

        let mut space = BTreeMap::new();
        for filter in state.filters_of(parent_id) {
            if let Some(node_space) = state.node_filter_space(node.id, &filter.uuid) {
                let values = behavior_for(filter.filter_type)
                    .node_filter_space_as_list(node_space, &state.filter_spaces);
                space.insert(filter.uuid_key(), values);
            }
        }

        CacheItem {
            id: node.id,
            meta_node_id: node.meta_node_id,
            node_type: meta.map_or(crate::models::NodeType::Node, |m| m.node_type),
            image_url: meta.and_then(|m| m.image_url.clone()),
            uuid: node.name_uuid,
            space,
            is_visible: true,
            name: meta.and_then(|m| m.name.clone()),
            decision_rule: child.decision_rule().map(str::to_string),
            taxon: meta.and_then(|m| m.taxon.clone()),
        }
    }

    /// Authoritative cache of `parent_id`, computed from relational state
    pub fn compute(state: &GuideState, parent_id: NodeId) -> ChildrenCache {
        let items = state
            .effective_children(parent_id)
            .iter()
            .map(|child| Self::child_as_item(state, parent_id, child))
            .collect();

        let matrix_filter_types = state
            .filters_of(parent_id)
            .into_iter()
            .map(|f| (f.uuid_key(), f.filter_type))
            .collect();

        ChildrenCache {
            items,
            matrix_filter_types,
        }
    }

    fn data(&mut self, parent_id: NodeId) -> &mut ChildrenCache {
        self.state.children_caches.entry(parent_id).or_default()
    }

    /// Keep items in effective child order
    fn sort_items(&mut self, parent_id: NodeId) {
        let order: HashMap<Uuid, usize> = self
            .state
            .effective_children(parent_id)
            .iter()
            .enumerate()
            .map(|(index, child)| (child.node.name_uuid, index))
            .collect();

        if let Some(cache) = self.state.children_caches.get_mut(&parent_id) {
            cache
                .items
                .sort_by_key(|item| order.get(&item.uuid).copied().unwrap_or(usize::MAX));
        }
    }

    // ---- child management ----------------------------------------------------

    /// Recompute and upsert the entry of `child_id` below `parent_id`
    ///
    /// Returns `false` if the node is not an effective child of the parent.
    pub fn add_or_update_child(&mut self, parent_id: NodeId, child_id: NodeId) -> bool {
        let Some(child) = self.state.effective_child(parent_id, child_id) else {
            return false;
        };
        let item = Self::child_as_item(&*self.state, parent_id, &child);

        debug!(parent_id, child_id, "Children cache: add or update child");
        self.data(parent_id).upsert(item);
        self.sort_items(parent_id);
        true
    }

    /// Remove the entry with `child_uuid` below `parent_id`
    pub fn remove_child(&mut self, parent_id: NodeId, child_uuid: &Uuid) {
        debug!(parent_id, %child_uuid, "Children cache: remove child");
        if let Some(cache) = self.state.children_caches.get_mut(&parent_id) {
            cache.remove(child_uuid);
        }
    }

    /// Re-sort a parent's items after positions changed
    pub fn reorder(&mut self, parent_id: NodeId) {
        self.sort_items(parent_id);
    }

    // ---- matrix filter management -------------------------------------------

    /// Register a filter type; children's `space` is left as is
    pub fn add_matrix_filter(&mut self, filter: &MatrixFilter) {
        debug!(parent_id = filter.node_id, uuid = %filter.uuid, "Children cache: add matrix filter");
        self.data(filter.node_id)
            .matrix_filter_types
            .insert(filter.uuid_key(), filter.filter_type);
    }

    /// Unregister a filter type; children's `space` is left as is
    pub fn remove_matrix_filter(&mut self, filter: &MatrixFilter) {
        debug!(parent_id = filter.node_id, uuid = %filter.uuid, "Children cache: remove matrix filter");
        if let Some(cache) = self.state.children_caches.get_mut(&filter.node_id) {
            cache.matrix_filter_types.remove(&filter.uuid_key());
        }
    }

    // ---- matrix filter space management -------------------------------------

    /// Repoint children that carry `old_value` for the filter to `new_value`
    pub fn update_matrix_filter_space(&mut self, filter_uuid: &Uuid, old_value: &Value, new_value: &Value) {
        let Some(parent_id) = self.state.matrix_filter(filter_uuid).map(|f| f.node_id) else {
            return;
        };
        let key = filter_uuid.to_string();
        let Some(cache) = self.state.children_caches.get_mut(&parent_id) else {
            return;
        };

        for item in cache.items.iter_mut() {
            if let Some(values) = item.space.get_mut(&key) {
                if let Some(slot) = values.iter_mut().find(|v| *v == old_value) {
                    *slot = new_value.clone();
                }
            }
        }
        debug!(parent_id, %filter_uuid, "Children cache: updated matrix filter space");
    }

    /// Strip a removed Color/DescriptiveTextAndImages/TextOnly value from children
    pub fn remove_matrix_filter_space(&mut self, space: &MatrixFilterSpace) {
        let Some(filter) = self.state.matrix_filter(&space.matrix_filter_uuid) else {
            return;
        };
        if !filter.filter_type.is_multispace() {
            return;
        }
        let parent_id = filter.node_id;
        let key = filter.uuid_key();
        let value = space.encoded_space.to_value();

        let Some(cache) = self.state.children_caches.get_mut(&parent_id) else {
            return;
        };
        for item in cache.items.iter_mut() {
            if let Some(values) = item.space.get_mut(&key) {
                if let Some(index) = values.iter().position(|v| *v == value) {
                    values.remove(index);
                }
            }
        }
        debug!(parent_id, space_id = space.id, "Children cache: removed matrix filter space");
    }

    // ---- rebuild ------------------------------------------------------------

    /// Recompute one parent's cache, returns whether it had drifted
    pub fn rebuild(&mut self, parent_id: NodeId) -> bool {
        let computed = Self::compute(&*self.state, parent_id);
        let current = self.state.children_caches.get(&parent_id);
        let drifted = current.cloned().unwrap_or_default() != computed;

        if current.is_some() || !computed.is_empty() {
            self.state.children_caches.insert(parent_id, computed);
        }
        drifted
    }

    /// Recompute every parent's cache and drop caches of vanished parents
    ///
    /// Returns the ids of parents whose cache changed.
    pub fn rebuild_all(&mut self) -> Vec<NodeId> {
        let parents: Vec<NodeId> = self
            .state
            .nodes
            .values()
            .filter(|n| {
                self.state
                    .meta_for(n)
                    .map_or(true, |m| m.node_type.can_have_children())
            })
            .map(|n| n.id)
            .collect();

        let mut drifted: Vec<NodeId> = self
            .state
            .children_caches
            .keys()
            .copied()
            .filter(|id| !parents.contains(id))
            .collect();
        for orphan in &drifted {
            self.state.children_caches.remove(orphan);
        }

        for parent_id in parents {
            if self.rebuild(parent_id) {
                drifted.push(parent_id);
            }
        }

        drifted.sort_unstable();
        if !drifted.is_empty() {
            tracing::warn!(?drifted, "Children caches drifted from relational state");
        }
        drifted
    }
}
