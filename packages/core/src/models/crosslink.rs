//! Crosslinks
//!
//! A crosslink lets a node appear as a child of a second parent without leaving
//! its own tree position. The link has its own decision rule and position, which
//! take precedence over the node's own values below that parent.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

pub type CrosslinkId = u64;

/// Directed parent → child edge in addition to the tree edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crosslink {
    pub id: CrosslinkId,
    pub parent_id: NodeId,
    pub child_id: NodeId,
    pub decision_rule: Option<String>,
    pub position: u32,
}

impl Crosslink {
    pub fn new(id: CrosslinkId, parent_id: NodeId, child_id: NodeId, position: u32) -> Self {
        Self {
            id,
            parent_id,
            child_id,
            decision_rule: None,
            position,
        }
    }

    pub fn connects(&self, parent_id: NodeId, child_id: NodeId) -> bool {
        self.parent_id == parent_id && self.child_id == child_id
    }

    pub fn touches(&self, node_id: NodeId) -> bool {
        self.parent_id == node_id || self.child_id == node_id
    }
}

/// A crosslink expressed as `(parent_nuid, child_nuid)`
pub type NuidPair = (String, String);
