//! Node Disassembler
//!
//! Shuts a powered-on node down and hands its blade and remote targets
//! back to the pool. A failed shutdown changes nothing and may be retried.

use crate::domain::{Blade, ComposedNodeId, ComposedNodeState, ComputeActionsRef};
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::metrics::{ComposerMetrics, Outcome};
use std::sync::Arc;
use tracing::{info, warn};

pub struct NodeDisassembler {
    inventory: Arc<Inventory>,
    compute: ComputeActionsRef,
    metrics: Arc<ComposerMetrics>,
}

impl NodeDisassembler {
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

    pub async fn disassemble(&self, node_id: ComposedNodeId) -> Result<()> {
        let result = self.run(node_id).await;
        self.metrics.record_disassembly(Outcome::of(&result));
        result
    }

    async fn run(&self, node_id: ComposedNodeId) -> Result<()> {
        let (state, blade) = self.inventory.read(|tables| -> Result<(ComposedNodeState, Option<Blade>)> {
            let node = tables.composed_node(node_id)?;
            let blade = node.blade.and_then(|id| tables.blade(id).ok().cloned());
            Ok((node.state, blade))
        })?;

        if state == ComposedNodeState::Released {
            return Err(Error::NodeAction(format!(
                "Composed node {} is already released",
                node_id
            )));
        }

        if state == ComposedNodeState::PoweredOn {
            if let Some(blade) = &blade {
                self.compute.shutdown_gracefully(blade).await.map_err(|e| {
                    Error::Disassembly(format!(
                        "Graceful shutdown of {} failed: {}",
                        node_id, e
                    ))
                })?;
            }
        }

        self.inventory.unit_of_work(|uow| {
            let node = uow.composed_node(node_id)?;
            // A concurrent disassembly may have won while we were shutting down
            if node.state == ComposedNodeState::Released {
                return Err(Error::NodeAction(format!(
                    "Composed node {} was released concurrently",
                    node_id
                )));
            }
            let (blade_id, targets) = (node.blade, node.remote_targets.clone());

            if let Some(blade_id) = blade_id {
                let holder = uow.blade_holder(blade_id, node_id);
                match (holder, uow.blade_mut(blade_id)) {
                    (Some(holder), _) => warn!("Blade {} now belongs to {}", blade_id, holder),
                    (None, Ok(blade)) => blade.allocated = false,
                    (None, Err(_)) => warn!("Blade {} of {} is gone", blade_id, node_id),
                }
            }
            for target_id in targets {
                let holder = uow.target_holder(target_id, node_id);
                match (holder, uow.remote_target_mut(target_id)) {
                    (Some(holder), _) => {
                        warn!("Remote target {} now belongs to {}", target_id, holder)
                    }
                    (None, Ok(target)) => target.allocated = false,
                    (None, Err(_)) => warn!("Remote target {} of {} is gone", target_id, node_id),
                }
            }

            uow.set_node_state(node_id, ComposedNodeState::Released)
        })?;

        info!("Composed node {} disassembled", node_id);
        Ok(())
    }
}
