//! Service Layer Error Types
//!
//! This module defines the error type returned by guide operations. Every error
//! is local and recoverable: the failing operation leaves the guide unchanged.

use crate::behaviors::BehaviorError;
use crate::db::{NuidError, StoreError};
use crate::models::ValidationError;
use thiserror::Error;

/// Guide operation errors
#[derive(Error, Debug)]
pub enum KeyServiceError {
    /// Node not found by id
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Matrix filter not found by uuid
    #[error("Matrix filter not found: {uuid}")]
    MatrixFilterNotFound { uuid: String },

    /// Filter space not found by id
    #[error("Filter space not found: {id}")]
    FilterSpaceNotFound { id: String },

    /// Crosslink not found
    #[error("Crosslink not found: {id}")]
    CrosslinkNotFound { id: String },

    /// Tree structure rule violated
    #[error("Hierarchy constraint violated: {0}")]
    HierarchyViolation(String),

    /// The change would make the tree circular through crosslinks
    #[error("This would create an invalid tree: {context}")]
    CircularConnection { context: String },

    /// Encoded space has the wrong shape for its filter
    #[error("Invalid encoded space: {0}")]
    InvalidEncodedSpace(#[from] BehaviorError),

    /// Authored data failed validation
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Nuid allocation failed
    #[error("Nuid error: {0}")]
    Nuid(#[from] NuidError),

    /// Persisting the guide failed
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    /// Service could not be opened
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

impl KeyServiceError {
    /// Create a node not found error
    pub fn node_not_found(id: impl ToString) -> Self {
        Self::NodeNotFound { id: id.to_string() }
    }

    /// Create a matrix filter not found error
    pub fn matrix_filter_not_found(uuid: impl ToString) -> Self {
        Self::MatrixFilterNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create a filter space not found error
    pub fn filter_space_not_found(id: impl ToString) -> Self {
        Self::FilterSpaceNotFound { id: id.to_string() }
    }

    /// Create a crosslink not found error
    pub fn crosslink_not_found(id: impl ToString) -> Self {
        Self::CrosslinkNotFound { id: id.to_string() }
    }

    /// Create a hierarchy violation error
    pub fn hierarchy_violation(msg: impl Into<String>) -> Self {
        Self::HierarchyViolation(msg.into())
    }

    /// Create a circular connection error
    pub fn circular_connection(context: impl Into<String>) -> Self {
        Self::CircularConnection {
            context: context.into(),
        }
    }

    /// Create an initialization error
    pub fn initialization_error(msg: impl Into<String>) -> Self {
        Self::InitializationError(msg.into())
    }

    /// True for errors caused by a would-be cycle
    pub fn is_circular_connection(&self) -> bool {
        matches!(self, Self::CircularConnection { .. })
    }

    /// True for tree structure violations
    pub fn is_hierarchy_violation(&self) -> bool {
        matches!(self, Self::HierarchyViolation(_))
    }
}
