//! Tree Node Data Structures
//!
//! A guide is a tree of [`TreeNode`]s. Everything that several tree positions can
//! share (name, node type, taxon, image) lives on a [`MetaNode`]; the tree node
//! itself carries its address (`nuid`), ordering and decision rule.
//!
//! # Examples
//!
//! ```rust
//! use naturekey_core::models::{NodeType, TreeNode};
//!
//! let node = TreeNode::new(2, "001001001".to_string(), Some(1), 2, 1);
//! assert_eq!(node.depth(), 3);
//! assert!(!node.is_root());
//! assert_eq!("result".parse::<NodeType>().unwrap(), NodeType::Result);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::db::nuid::NuidManager;

/// Tree node identifier, allocated sequentially per guide
pub type NodeId = u64;

/// Meta node identifier
pub type MetaNodeId = u64;

/// Validation errors for authored data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{field}' exceeds {max} characters ({actual})")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid filter type: {0}")]
    InvalidFilterType(String),

    #[error("Name '{0}' is already in use")]
    DuplicateName(String),

    #[error("Invalid filter definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid filter space assignment: {0}")]
    InvalidAssignment(String),

    #[error("Weight must be between 0 and 100, got {0}")]
    InvalidWeight(u8),
}

impl ValidationError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn invalid_assignment(msg: impl Into<String>) -> Self {
        Self::InvalidAssignment(msg.into())
    }

    pub fn invalid_definition(msg: impl Into<String>) -> Self {
        Self::InvalidDefinition(msg.into())
    }
}

/// Reject text longer than `max` characters
pub fn check_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
            actual,
        });
    }
    Ok(())
}

/// Role of a node inside the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Start of the key, exactly one per guide
    Root,
    /// Intermediate decision node
    Node,
    /// Identification result, never has tree children
    Result,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Root => "root",
            NodeType::Node => "node",
            NodeType::Result => "result",
        }
    }

    pub fn can_have_children(&self) -> bool {
        !matches!(self, NodeType::Result)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(NodeType::Root),
            "node" => Ok(NodeType::Node),
            "result" => Ok(NodeType::Result),
            other => Err(ValidationError::InvalidNodeType(other.to_string())),
        }
    }
}

/// Reference to a taxon in some taxonomy source
///
/// The same shape is used for taxa assigned to meta nodes and for the taxa listed
/// inside taxon filter entries, so `taxon_author` is serialized even when absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeTaxon {
    pub taxon_source: String,
    pub taxon_latname: String,
    pub taxon_author: Option<String>,
    pub name_uuid: String,
    pub taxon_nuid: String,
}

impl NodeTaxon {
    pub fn new(
        taxon_source: impl Into<String>,
        taxon_latname: impl Into<String>,
        taxon_author: Option<String>,
        name_uuid: impl Into<String>,
        taxon_nuid: impl Into<String>,
    ) -> Self {
        Self {
            taxon_source: taxon_source.into(),
            taxon_latname: taxon_latname.into(),
            taxon_author,
            name_uuid: name_uuid.into(),
            taxon_nuid: taxon_nuid.into(),
        }
    }

    /// True if this taxon is `other` or lies below it in the same source
    pub fn is_within(&self, other: &NodeTaxon) -> bool {
        self.taxon_source == other.taxon_source && self.taxon_nuid.starts_with(&other.taxon_nuid)
    }

    pub fn as_json(&self) -> Value {
        json!({
            "taxon_source": self.taxon_source,
            "taxon_latname": self.taxon_latname,
            "taxon_author": self.taxon_author,
            "name_uuid": self.name_uuid,
            "taxon_nuid": self.taxon_nuid,
        })
    }
}

/// Data shared by every tree position of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaNode {
    pub id: MetaNodeId,
    pub name: Option<String>,
    pub node_type: NodeType,
    pub taxon: Option<NodeTaxon>,
    pub image_url: Option<String>,
}

impl MetaNode {
    pub fn new(id: MetaNodeId, name: Option<String>, node_type: NodeType) -> Self {
        Self {
            id,
            name,
            node_type,
            taxon: None,
            image_url: None,
        }
    }
}

/// One position in the identification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,

    /// Hierarchical address, see [`NuidManager`]
    pub nuid: String,

    /// `None` only for the root
    pub parent_id: Option<NodeId>,

    pub meta_node_id: MetaNodeId,

    /// Short text shown to justify choosing this node
    pub decision_rule: Option<String>,

    /// Sibling order, 1-based
    pub position: u32,

    /// Stable external identity, independent of nuid and position
    pub name_uuid: Uuid,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl TreeNode {
    pub fn new(
        id: NodeId,
        nuid: String,
        parent_id: Option<NodeId>,
        meta_node_id: MetaNodeId,
        position: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            nuid,
            parent_id,
            meta_node_id,
            decision_rule: None,
            position,
            name_uuid: Uuid::new_v4(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn depth(&self) -> usize {
        NuidManager::depth(&self.nuid)
    }

    /// True if this node lies strictly below `ancestor`
    pub fn is_descendant_of(&self, ancestor: &TreeNode) -> bool {
        NuidManager::is_descendant(&self.nuid, &ancestor.nuid)
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}
