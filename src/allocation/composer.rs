//! Node Composer
//!
//! Reserves a blade for a template and settles its remote storage. Both
//! steps are single units of work; nothing is committed when they fail.

use super::matcher::HostMatcher;
use super::remote_target::{RemoteTargetSupplier, TargetCreationPlan};
use crate::domain::{ComposedNodeId, ComposedNodeState, RemoteTargetId, RequestedNode};
use crate::error::{Error, Result};
use crate::inventory::{Inventory, UnitOfWork};
use crate::provisioning::{ProvisioningHandle, RemoteTargetCreationDelegate};
use std::sync::Arc;
use tracing::info;

/// How the remote drive of a template was settled
#[derive(Debug, Clone)]
pub enum RemoteDriveAllocation {
    /// The template has no remote drive
    NotRequired,
    /// An existing target was linked
    Existing(RemoteTargetId),
    /// A new target is being created in the background
    Delegated(ProvisioningHandle),
}

impl RemoteDriveAllocation {
    pub fn handle(&self) -> Option<&ProvisioningHandle> {
        match self {
            RemoteDriveAllocation::Delegated(handle) => Some(handle),
            _ => None,
        }
    }
}

enum RemoteDriveStep {
    Settled(RemoteDriveAllocation),
    Create(TargetCreationPlan),
}

pub struct NodeComposer {
    inventory: Arc<Inventory>,
    delegate: Arc<RemoteTargetCreationDelegate>,
}

impl NodeComposer {
    pub fn new(inventory: Arc<Inventory>, delegate: Arc<RemoteTargetCreationDelegate>) -> Self {
        Self {
            inventory,
            delegate,
        }
    }

    /// Reserve the first matching blade and create an ALLOCATING node
    /// linked to every one of its components
    pub fn allocate(&self, template: &RequestedNode) -> Result<ComposedNodeId> {
        Self::verify_template(template)?;

        let node_id = self.inventory.unit_of_work(|uow| {
            let blade = HostMatcher::matches(template, uow.unallocated_blades())?
                .first()
                .map(|blade| (*blade).clone())
                .ok_or_else(|| Error::Allocation("No assets available for allocation".into()))?;

            let node = uow.create_composed_node(&template.name);
            node.description = template.description.clone();
            node.link_blade(&blade);
            let node_id = node.id;

            uow.blade_mut(blade.id)?.allocated = true;
            Ok(node_id)
        })?;

        info!(
            node_id = %node_id,
            template = %template.name,
            "Allocated composed node"
        );
        Ok(node_id)
    }

    /// Settle the remote drive of a freshly allocated node.
    ///
    /// New targets are created by a background task, so this must run
    /// inside a tokio runtime.
    pub fn allocate_remote_target_if_required(
        &self,
        template: &RequestedNode,
        node_id: ComposedNodeId,
    ) -> Result<RemoteDriveAllocation> {
        let step = self.inventory.unit_of_work(|uow| {
            uow.composed_node(node_id)?;

            let Some(spec) = template.remote_drives.first() else {
                uow.set_node_state(node_id, ComposedNodeState::Allocated)?;
                return Ok(RemoteDriveStep::Settled(RemoteDriveAllocation::NotRequired));
            };

            if RemoteTargetSupplier::is_defining_existing_target(spec) {
                let target_id = RemoteTargetSupplier::find_remote_target(uow, spec)?;
                Self::allocate_remote_target(uow, node_id, target_id)?;
                return Ok(RemoteDriveStep::Settled(RemoteDriveAllocation::Existing(
                    target_id,
                )));
            }

            if RemoteTargetSupplier::target_exists(uow, spec) {
                return Err(Error::Allocation(
                    "Target with provided iqn already exists".into(),
                ));
            }

            let plan = RemoteTargetSupplier::initialize_new_target_creation(uow, node_id, spec)?;
            Ok(RemoteDriveStep::Create(plan))
        })?;

        match step {
            RemoteDriveStep::Settled(allocation) => {
                info!("Composed node {} allocated", node_id);
                Ok(allocation)
            }
            RemoteDriveStep::Create(plan) => {
                info!(
                    node_id = %node_id,
                    storage_service = %plan.storage_service_id,
                    volume_group = %plan.volume_group_id,
                    "Waiting for new remote target {}",
                    plan.target_iqn
                );
                Ok(RemoteDriveAllocation::Delegated(
                    self.delegate.create_remote_target(plan),
                ))
            }
        }
    }

    /// Link a target to a node and complete its allocation
    pub fn allocate_remote_target(
        uow: &mut UnitOfWork,
        node_id: ComposedNodeId,
        target_id: RemoteTargetId,
    ) -> Result<()> {
        uow.remote_target_mut(target_id)?.allocated = true;
        uow.composed_node_mut(node_id)?.link_remote_target(target_id);
        uow.set_node_state(node_id, ComposedNodeState::Allocated)
    }

    /// Fail a node whose target could not be created. Released nodes stay
    /// released.
    pub fn handle_remote_target_creation_failure(
        uow: &mut UnitOfWork,
        node_id: ComposedNodeId,
    ) -> Result<()> {
        if uow.composed_node(node_id)?.state == ComposedNodeState::Released {
            return Ok(());
        }
        uow.set_node_state(node_id, ComposedNodeState::Failed)
    }

    fn verify_template(template: &RequestedNode) -> Result<()> {
        if template.distinct_locations().len() > 1 {
            return Err(Error::Allocation(
                "Allocation of assets on multiple locations is not supported".into(),
            ));
        }
        if template.remote_drives.len() > 1 {
            return Err(Error::Allocation(
                "Allocation of more than one remote drive is not supported".into(),
            ));
        }
        Ok(())
    }
}
