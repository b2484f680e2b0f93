//! Children cache documents
//!
//! One [`ChildrenCache`] exists per parent node. It holds the rendered entry of
//! every effective child (tree children and crosslinked children) together with
//! the uuid → type map of the parent's matrix filters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::matrix_filter::MatrixFilterType;
use super::node::{MetaNodeId, NodeId, NodeTaxon, NodeType};

/// Rendered entry of one child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    pub id: NodeId,
    pub meta_node_id: MetaNodeId,
    pub node_type: NodeType,
    pub image_url: Option<String>,

    /// The child's `name_uuid`
    pub uuid: Uuid,

    /// filter uuid → assigned values
    pub space: BTreeMap<String, Vec<Value>>,

    pub is_visible: bool,
    pub name: Option<String>,
    pub decision_rule: Option<String>,
    pub taxon: Option<NodeTaxon>,
}

/// Denormalized view of one parent's children
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildrenCache {
    pub items: Vec<CacheItem>,
    pub matrix_filter_types: BTreeMap<String, MatrixFilterType>,
}

impl ChildrenCache {
    pub fn item(&self, uuid: &Uuid) -> Option<&CacheItem> {
        self.items.iter().find(|item| &item.uuid == uuid)
    }

    /// Replace the entry with the same uuid or append
    pub fn upsert(&mut self, item: CacheItem) {
        match self.items.iter_mut().find(|existing| existing.uuid == item.uuid) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    /// Remove the entry with `uuid`, returns whether one existed
    pub fn remove(&mut self, uuid: &Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.uuid != uuid);
        before != self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.matrix_filter_types.is_empty()
    }
}
