//! Composed Node Service
//!
//! Facade over allocation, provisioning and the node lifecycle. Owns the
//! reconciler task once started.

use crate::allocation::{HostMatcher, NodeComposer, RemoteDriveAllocation};
use crate::config::ComposerConfig;
use crate::domain::{
    BladeId, ComposedNode, ComposedNodeId, ComposedNodeState, ComputeActionsRef, RequestedNode,
    ResetType, StorageControlPlaneRef,
};
use crate::error::Result;
use crate::inventory::Inventory;
use crate::lifecycle::{NodeAssembler, NodeDisassembler, NodeReset};
use crate::metrics::{ComposerMetrics, Outcome};
use crate::provisioning::{RemoteTargetCreationDelegate, RemoteTargetCreationReconciler};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of a composed node request
#[derive(Debug, Clone)]
pub struct ComposedNodeCreation {
    pub node_id: ComposedNodeId,
    pub remote: RemoteDriveAllocation,
}

pub struct ComposedNodeService {
    inventory: Arc<Inventory>,
    composer: NodeComposer,
    assembler: NodeAssembler,
    disassembler: NodeDisassembler,
    reset: NodeReset,
    reconciler: Arc<RemoteTargetCreationReconciler>,
    metrics: Arc<ComposerMetrics>,
}

impl ComposedNodeService {
    pub fn new(
        inventory: Arc<Inventory>,
        compute: ComputeActionsRef,
        control_plane: StorageControlPlaneRef,
        config: &ComposerConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let metrics = Arc::new(ComposerMetrics::new()?);

        let reconciler = RemoteTargetCreationReconciler::new(
            inventory.clone(),
            config.reconciler.clone(),
            metrics.clone(),
        );
        let delegate = RemoteTargetCreationDelegate::new(
            inventory.clone(),
            control_plane,
            reconciler.clone(),
            config.provisioning.max_concurrent_creations,
            config.provisioning.initiator_iqn.clone(),
        );

        Ok(Arc::new(Self {
            composer: NodeComposer::new(inventory.clone(), delegate),
            assembler: NodeAssembler::new(inventory.clone(), compute.clone(), metrics.clone()),
            disassembler: NodeDisassembler::new(inventory.clone(), compute.clone(), metrics.clone()),
            reset: NodeReset::new(inventory.clone(), compute),
            inventory,
            reconciler,
            metrics,
        }))
    }

    /// Start the reconciler loop
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.reconciler.spawn(shutdown)
    }

    /// Allocate a node for the template and settle its remote drive. When
    /// the remote drive cannot be settled the node is FAILED and its blade
    /// goes back to the pool.
    pub fn create_composed_node(&self, template: &RequestedNode) -> Result<ComposedNodeCreation> {
        let result = self.compose(template);
        self.metrics.record_allocation(Outcome::of(&result));
        result
    }

    fn compose(&self, template: &RequestedNode) -> Result<ComposedNodeCreation> {
        let node_id = self.composer.allocate(template)?;

        match self
            .composer
            .allocate_remote_target_if_required(template, node_id)
        {
            Ok(remote) => Ok(ComposedNodeCreation { node_id, remote }),
            Err(e) => {
                warn!("Remote drive for {} could not be allocated: {}", node_id, e);
                self.release_failed_allocation(node_id);
                Err(e)
            }
        }
    }

    fn release_failed_allocation(&self, node_id: ComposedNodeId) {
        let result = self.inventory.unit_of_work(|uow| {
            let blade = uow.composed_node(node_id)?.blade;
            if let Some(blade_id) = blade {
                uow.blade_mut(blade_id)?.allocated = false;
                uow.composed_node_mut(node_id)?.unlink_blade();
            }
            uow.set_node_state(node_id, ComposedNodeState::Failed)
        });
        if let Err(e) = result {
            error!("Could not release blade of {}: {}", node_id, e);
        }
    }

    pub async fn assemble(&self, node_id: ComposedNodeId) -> Result<()> {
        self.assembler.assemble(node_id).await
    }

    pub async fn disassemble(&self, node_id: ComposedNodeId) -> Result<()> {
        self.disassembler.disassemble(node_id).await
    }

    pub async fn reset(
        &self,
        node_id: ComposedNodeId,
        reset_type: ResetType,
    ) -> Result<ComposedNodeState> {
        self.reset.reset(node_id, reset_type).await
    }

    pub fn composed_node(&self, node_id: ComposedNodeId) -> Result<ComposedNode> {
        self.inventory
            .read(|tables| tables.composed_node(node_id).cloned())
    }

    pub fn composed_nodes(&self) -> Vec<ComposedNode> {
        self.inventory
            .read(|tables| tables.composed_nodes().cloned().collect())
    }

    /// Unallocated blades the template would accept, in pool order
    pub fn matching_blades(&self, template: &RequestedNode) -> Result<Vec<BladeId>> {
        let blades = self.inventory.read(|tables| {
            HostMatcher::matches(template, tables.unallocated_blades())
                .map(|blades| blades.iter().map(|blade| blade.id).collect::<Vec<_>>())
        })?;
        info!(
            "{} blade(s) match template {}",
            blades.len(),
            template.name
        );
        Ok(blades)
    }

    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    pub fn reconciler(&self) -> &Arc<RemoteTargetCreationReconciler> {
        &self.reconciler
    }

    pub fn metrics(&self) -> &Arc<ComposerMetrics> {
        &self.metrics
    }
}
