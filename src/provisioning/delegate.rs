//! Remote Target Creation Delegate
//!
//! Runs the two-step provisioning of a new remote target (create a logical
//! volume, then a target serving it) on a bounded pool of background tasks.
//! Callers get a pollable `ProvisioningHandle`; the pending creation is
//! registered with the reconciler, which completes the node's allocation.

use super::reconciler::RemoteTargetCreationReconciler;
use crate::allocation::{NodeComposer, TargetCreationPlan};
use crate::domain::{
    LogicalVolumeCreationRequest, RemoteTargetCreationRequest, ReplicationMethod,
    StorageControlPlaneRef,
};
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Logical unit number of the volume on a new target
const TARGET_LUN: u32 = 1;

// =============================================================================
// Provisioning Handle
// =============================================================================

/// State of a background target creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningStatus {
    Pending,
    /// Carries the absolute address of the new target
    Completed(String),
    Failed(String),
}

impl ProvisioningStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ProvisioningStatus::Pending)
    }
}

/// Pollable, awaitable handle of a background target creation
#[derive(Debug, Clone)]
pub struct ProvisioningHandle {
    status: watch::Receiver<ProvisioningStatus>,
    cancel: CancellationToken,
}

impl ProvisioningHandle {
    fn new() -> (watch::Sender<ProvisioningStatus>, Self) {
        let (sender, status) = watch::channel(ProvisioningStatus::Pending);
        let handle = Self {
            status,
            cancel: CancellationToken::new(),
        };
        (sender, handle)
    }

    /// Current status without waiting
    pub fn status(&self) -> ProvisioningStatus {
        let current = self.status.borrow().clone();
        // Task went away without reporting
        if current.is_pending() && self.status.has_changed().is_err() {
            return ProvisioningStatus::Failed("provisioning task terminated".into());
        }
        current
    }

    pub fn is_done(&self) -> bool {
        !self.status().is_pending()
    }

    /// Address of the created target, once completed successfully
    pub fn target_address(&self) -> Option<String> {
        match self.status() {
            ProvisioningStatus::Completed(address) => Some(address),
            _ => None,
        }
    }

    /// Wait until the creation completes or fails
    pub async fn wait(&self) -> ProvisioningStatus {
        let mut status = self.status.clone();
        let result = status.wait_for(|s| !s.is_pending()).await;
        match result {
            Ok(done) => done.clone(),
            Err(_) => ProvisioningStatus::Failed("provisioning task terminated".into()),
        }
    }

    /// Stop the creation if it is still running
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
impl ProvisioningHandle {
    /// Handle of a creation that never finishes
    pub(crate) fn pending() -> Self {
        let (sender, handle) = Self::new();
        // Keep the sender alive so the handle never reads as terminated
        std::mem::forget(sender);
        handle
    }

    pub(crate) fn completed(address: &str) -> Self {
        let (sender, handle) = Self::new();
        sender.send_replace(ProvisioningStatus::Completed(address.to_string()));
        handle
    }

    pub(crate) fn failed(reason: &str) -> Self {
        let (sender, handle) = Self::new();
        sender.send_replace(ProvisioningStatus::Failed(reason.to_string()));
        handle
    }
}

// =============================================================================
// Delegate
// =============================================================================

pub struct RemoteTargetCreationDelegate {
    inventory: Arc<Inventory>,
    control_plane: StorageControlPlaneRef,
    reconciler: Arc<RemoteTargetCreationReconciler>,
    workers: Arc<Semaphore>,
    initiator_iqn: Option<String>,
}

impl RemoteTargetCreationDelegate {
    pub fn new(
        inventory: Arc<Inventory>,
        control_plane: StorageControlPlaneRef,
        reconciler: Arc<RemoteTargetCreationReconciler>,
        max_concurrent: usize,
        initiator_iqn: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inventory,
            control_plane,
            reconciler,
            workers: Arc::new(Semaphore::new(max_concurrent.max(1))),
            initiator_iqn,
        })
    }

    /// Start creating the planned target in the background and register
    /// the pending creation. Must be called inside a tokio runtime.
    pub fn create_remote_target(&self, plan: TargetCreationPlan) -> ProvisioningHandle {
        let (sender, handle) = ProvisioningHandle::new();
        let node_id = plan.node_id;

        let inventory = self.inventory.clone();
        let control_plane = self.control_plane.clone();
        let workers = self.workers.clone();
        let cancel = handle.cancel.clone();
        let initiator_iqn = self.initiator_iqn.clone();

        tokio::spawn(async move {
            let work = async {
                match workers.acquire_owned().await {
                    Ok(_permit) => provision(&control_plane, &plan, initiator_iqn).await,
                    Err(e) => Err(Error::Internal(format!("worker pool closed: {}", e))),
                }
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(Error::Provisioning {
                    node_id: node_id.to_string(),
                    reason: "aborted".into(),
                }),
                result = work => result,
            };

            match result {
                Ok(address) => {
                    info!("Remote target {} created for {}", address, node_id);
                    sender.send_replace(ProvisioningStatus::Completed(address));
                }
                Err(e) => {
                    error!("Remote target creation for {} failed: {}", node_id, e);
                    // Node is FAILED before the handle reports the failure
                    if let Err(mark_err) = inventory.unit_of_work(|uow| {
                        NodeComposer::handle_remote_target_creation_failure(uow, node_id)
                    }) {
                        warn!("Could not mark {} as failed: {}", node_id, mark_err);
                    }
                    sender.send_replace(ProvisioningStatus::Failed(e.to_string()));
                }
            }
        });

        self.reconciler.register(node_id, handle.clone());
        handle
    }
}

async fn provision(
    control_plane: &StorageControlPlaneRef,
    plan: &TargetCreationPlan,
    initiator_iqn: Option<String>,
) -> Result<String> {
    let volume_request = LogicalVolumeCreationRequest {
        volume_group: plan.volume_group.clone(),
        capacity_gb: plan.capacity_gb,
        master_drive: plan.master_drive.clone(),
        snapshot: plan.replication == Some(ReplicationMethod::Snapshot),
    };
    let volume = control_plane
        .create_logical_volume(&plan.endpoint, &plan.storage_service, volume_request)
        .await
        .map_err(|e| Error::Provisioning {
            node_id: plan.node_id.to_string(),
            reason: format!("logical drive creation failed: {}", e),
        })?;

    let target_request = RemoteTargetCreationRequest {
        logical_drive: path_of(&volume),
        target_iqn: plan.target_iqn.clone(),
        lun: TARGET_LUN,
        initiator_iqn,
    };
    control_plane
        .create_target(&plan.endpoint, &plan.storage_service, target_request)
        .await
        .map_err(|e| Error::Provisioning {
            node_id: plan.node_id.to_string(),
            reason: format!("remote target creation failed: {}", e),
        })
}

/// Targets reference volumes by path, relative to the storage service host
fn path_of(address: &str) -> String {
    Url::parse(address)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| address.to_string())
}
