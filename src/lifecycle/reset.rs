//! Node Reset
//!
//! Power actions on assembled nodes.

use crate::domain::{ComposedNodeId, ComposedNodeState, ComputeActionsRef, ResetType};
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use std::sync::Arc;
use tracing::info;

/// Reset types a composed node accepts
pub const SUPPORTED_RESET_TYPES: [ResetType; 3] = [
    ResetType::On,
    ResetType::ForceOff,
    ResetType::GracefulShutdown,
];

pub struct NodeReset {
    inventory: Arc<Inventory>,
    compute: ComputeActionsRef,
}

impl NodeReset {
    pub fn new(inventory: Arc<Inventory>, compute: ComputeActionsRef) -> Self {
        Self { inventory, compute }
    }

    /// Reset the node's blade and record the resulting power state
    pub async fn reset(
        &self,
        node_id: ComposedNodeId,
        reset_type: ResetType,
    ) -> Result<ComposedNodeState> {
        if !SUPPORTED_RESET_TYPES.contains(&reset_type) {
            return Err(Error::NodeAction(format!(
                "Unsupported reset type: {:?}",
                reset_type
            )));
        }

        let blade = self.inventory.read(|tables| {
            let node = tables.composed_node(node_id)?;
            if !matches!(
                node.state,
                ComposedNodeState::PoweredOn | ComposedNodeState::PoweredOff
            ) {
                return Err(Error::NodeAction(format!(
                    "Node state invalid for power action: {}",
                    node.state
                )));
            }
            node.blade
                .and_then(|id| tables.blade(id).ok().cloned())
                .ok_or_else(|| {
                    Error::NodeAction(
                        "No blade is associated with the composed node, action aborted".into(),
                    )
                })
        })?;

        self.compute.reset(&blade, reset_type).await?;

        let state = match reset_type {
            ResetType::On => ComposedNodeState::PoweredOn,
            _ => ComposedNodeState::PoweredOff,
        };
        self.inventory
            .unit_of_work(|uow| uow.set_node_state(node_id, state))?;

        info!("Composed node {} reset ({:?}), now {}", node_id, reset_type, state);
        Ok(state)
    }
}
