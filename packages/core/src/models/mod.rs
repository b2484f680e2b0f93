//! Data Models
//!
//! Plain data structures of an identification guide:
//!
//! - [`TreeNode`] / [`MetaNode`] - tree positions and their shared data
//! - [`Crosslink`] - extra parent→child edges
//! - [`MatrixFilter`], [`MatrixFilterSpace`], [`NodeFilterSpace`] - traits, their values and assignments
//! - [`ChildrenCache`] - denormalized per-parent documents

pub mod children_cache;
pub mod crosslink;
pub mod matrix_filter;
pub mod node;

pub use children_cache::{CacheItem, ChildrenCache};
pub use crosslink::{Crosslink, CrosslinkId, NuidPair};
pub use matrix_filter::{
    EncodedSpace, FilterDefinition, FilterParameters, MatrixFilter, MatrixFilterSpace,
    MatrixFilterType, NodeFilterSpace, NodeFilterSpaceId, Rgba, SpaceId, TaxonFilterEntry,
    DEFAULT_WEIGHT,
};
pub use node::{
    check_length, MetaNode, MetaNodeId, NodeId, NodeTaxon, NodeType, TreeNode, ValidationError,
};
