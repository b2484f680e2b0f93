//! Domain Events for guide mutations
//!
//! Events are emitted by [`NatureGuideService`](crate::services::NatureGuideService)
//! over a tokio broadcast channel once a unit of work has been persisted. A
//! rejected operation emits nothing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CrosslinkId, NodeId, SpaceId};

/// Domain events emitted after a committed mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    NodeCreated { id: NodeId, nuid: String },
    NodeUpdated { id: NodeId },
    NodeMoved {
        id: NodeId,
        old_nuid: String,
        new_nuid: String,
    },
    NodeDeleted { id: NodeId },
    ChildrenReordered { parent_id: NodeId },

    CrosslinkCreated {
        id: CrosslinkId,
        parent_id: NodeId,
        child_id: NodeId,
    },
    CrosslinkDeleted { id: CrosslinkId },

    MatrixFilterCreated { uuid: Uuid, node_id: NodeId },
    MatrixFilterUpdated { uuid: Uuid },
    MatrixFilterDeleted { uuid: Uuid },

    /// A declared space was added, edited or removed
    FilterSpaceChanged { filter_uuid: Uuid, space_id: SpaceId },

    /// A child's assignment for a filter was set or cleared
    NodeFilterSpaceChanged { node_id: NodeId, filter_uuid: Uuid },

    /// Full rebuild finished; `drifted` lists parents whose cache changed
    ChildrenCachesRebuilt { drifted: Vec<NodeId> },
}

impl DomainEvent {
    /// Event type name, useful for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::NodeCreated { .. } => "node_created",
            DomainEvent::NodeUpdated { .. } => "node_updated",
            DomainEvent::NodeMoved { .. } => "node_moved",
            DomainEvent::NodeDeleted { .. } => "node_deleted",
            DomainEvent::ChildrenReordered { .. } => "children_reordered",
            DomainEvent::CrosslinkCreated { .. } => "crosslink_created",
            DomainEvent::CrosslinkDeleted { .. } => "crosslink_deleted",
            DomainEvent::MatrixFilterCreated { .. } => "matrix_filter_created",
            DomainEvent::MatrixFilterUpdated { .. } => "matrix_filter_updated",
            DomainEvent::MatrixFilterDeleted { .. } => "matrix_filter_deleted",
            DomainEvent::FilterSpaceChanged { .. } => "filter_space_changed",
            DomainEvent::NodeFilterSpaceChanged { .. } => "node_filter_space_changed",
            DomainEvent::ChildrenCachesRebuilt { .. } => "children_caches_rebuilt",
        }
    }
}
