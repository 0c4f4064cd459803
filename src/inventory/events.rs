//! Inventory Events
//!
//! Events published by the inventory after a unit of work commits, for
//! consumers such as the remote target reconciler.

use crate::domain::{BladeId, ComposedNodeId, ComposedNodeState, RemoteTargetId};
use serde::{Deserialize, Serialize};

/// Events emitted by the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryEvent {
    /// A blade was added to the pool
    BladeAdded { blade_id: BladeId },

    /// A remote target was discovered and committed
    RemoteTargetCreated { target_id: RemoteTargetId },

    /// A composed node changed lifecycle state
    NodeStateChanged {
        node_id: ComposedNodeId,
        from: ComposedNodeState,
        to: ComposedNodeState,
    },
}

impl InventoryEvent {
    /// Get the composed node associated with this event, if any
    pub fn node_id(&self) -> Option<ComposedNodeId> {
        match self {
            InventoryEvent::NodeStateChanged { node_id, .. } => Some(*node_id),
            _ => None,
        }
    }
}
