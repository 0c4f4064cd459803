//! Node Assembler
//!
//! Drives an ALLOCATED node to POWERED_ON: power off, permanent boot
//! override, power on. The node is FAILED before any error is returned.

use crate::domain::{BootSourceType, Blade, ComposedNodeId, ComposedNodeState, ComputeActionsRef};
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::metrics::{ComposerMetrics, Outcome};
use std::sync::Arc;
use tracing::{error, info};

pub struct NodeAssembler {
    inventory: Arc<Inventory>,
    compute: ComputeActionsRef,
    metrics: Arc<ComposerMetrics>,
}

impl NodeAssembler {
    pub fn new(
        inventory: Arc<Inventory>,
        compute: ComputeActionsRef,
        metrics: Arc<ComposerMetrics>,
    ) -> Self {
        Self {
            inventory,
            compute,
            metrics,
        }
    }

    pub async fn assemble(&self, node_id: ComposedNodeId) -> Result<()> {
        let result = self.run(node_id).await;
        self.metrics.record_assembly(Outcome::of(&result));
        result
    }

    async fn run(&self, node_id: ComposedNodeId) -> Result<()> {
        let (blade, boot_source) = self.prepare(node_id)?;

        info!(
            node_id = %node_id,
            blade_id = %blade.id,
            boot_source = %boot_source,
            "Assembling composed node"
        );

        let actions = async {
            self.compute.power_off(&blade).await?;
            self.compute
                .override_boot_source_permanently(&blade, boot_source)
                .await?;
            self.compute.power_on(&blade).await
        };

        if let Err(e) = actions.await {
            error!("Assembly of {} failed: {}", node_id, e);
            self.mark_failed(node_id);
            return Err(Error::Assembly(format!(
                "Composed node {} assembly failed: {}",
                node_id, e
            )));
        }

        self.inventory
            .unit_of_work(|uow| uow.set_node_state(node_id, ComposedNodeState::PoweredOn))?;
        info!("Composed node {} assembled", node_id);
        Ok(())
    }

    /// Check the precondition and take a copy of the blade to act on.
    /// A node without a blade is failed here.
    fn prepare(&self, node_id: ComposedNodeId) -> Result<(Blade, BootSourceType)> {
        let prepared = self.inventory.unit_of_work(|uow| {
            let (state, blade_id, boot_source) = {
                let node = uow.composed_node(node_id)?;
                (node.state, node.blade, node.boot_source())
            };

            if state != ComposedNodeState::Allocated {
                return Err(Error::Assembly(format!(
                    "Composed node {} is {}, only ALLOCATED nodes can be assembled",
                    node_id, state
                )));
            }

            let blade = blade_id.and_then(|id| uow.blade(id).ok().cloned());
            if blade.is_none() {
                uow.set_node_state(node_id, ComposedNodeState::Failed)?;
            }
            Ok(blade.map(|blade| (blade, boot_source)))
        })?;

        prepared.ok_or_else(|| {
            Error::Assembly(format!("Composed node {} has no blade", node_id))
        })
    }

    fn mark_failed(&self, node_id: ComposedNodeId) {
        if let Err(e) = self
            .inventory
            .unit_of_work(|uow| uow.set_node_state(node_id, ComposedNodeState::Failed))
        {
            error!("Could not mark {} as failed: {}", node_id, e);
        }
    }
}
