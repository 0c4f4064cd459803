//! Domain Ports - Action traits for the external collaborators
//!
//! The composer never talks to hardware or storage services directly.
//! Adapters implement these traits to provide concrete functionality.

use crate::domain::model::{Blade, BootSourceType, ResetType};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Storage Control Plane Requests
// =============================================================================

/// Request to carve a new logical volume out of a volume group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalVolumeCreationRequest {
    /// Path of the volume group the new volume is carved from
    pub volume_group: String,
    /// Requested capacity in GB
    pub capacity_gb: u64,
    /// Path of the master volume to clone or snapshot
    pub master_drive: Option<String>,
    /// Snapshot (true) or full clone (false) of the master
    pub snapshot: bool,
}

/// Request to expose a logical volume as an iSCSI target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTargetCreationRequest {
    /// Path of the logical volume served by the target
    pub logical_drive: String,
    pub target_iqn: String,
    /// Logical unit number of the volume on the target
    pub lun: u32,
    #[serde(default)]
    pub initiator_iqn: Option<String>,
}

// =============================================================================
// Compute Actions
// =============================================================================

/// Power and boot actions on a physical blade
#[async_trait]
pub trait ComputeActions: Send + Sync {
    /// Issue a reset action
    async fn reset(&self, blade: &Blade, reset_type: ResetType) -> Result<()>;

    /// Permanently override the boot source
    async fn override_boot_source_permanently(
        &self,
        blade: &Blade,
        boot_source: BootSourceType,
    ) -> Result<()>;

    async fn power_off(&self, blade: &Blade) -> Result<()> {
        self.reset(blade, ResetType::ForceOff).await
    }

    async fn power_on(&self, blade: &Blade) -> Result<()> {
        self.reset(blade, ResetType::On).await
    }

    async fn shutdown_gracefully(&self, blade: &Blade) -> Result<()> {
        self.reset(blade, ResetType::GracefulShutdown).await
    }
}

// =============================================================================
// Storage Control Plane
// =============================================================================

/// Client of the storage services hosting logical volumes and targets
#[async_trait]
pub trait StorageControlPlane: Send + Sync {
    /// Create a logical volume and wait until the service reports it ready.
    /// Returns the address of the new volume.
    async fn create_logical_volume(
        &self,
        endpoint: &str,
        storage_service: &str,
        request: LogicalVolumeCreationRequest,
    ) -> Result<String>;

    /// Create a remote target. Returns the address of the new target.
    async fn create_target(
        &self,
        endpoint: &str,
        storage_service: &str,
        request: RemoteTargetCreationRequest,
    ) -> Result<String>;
}

// =============================================================================
// Type Aliases
// =============================================================================

pub type ComputeActionsRef = Arc<dyn ComputeActions>;
pub type StorageControlPlaneRef = Arc<dyn StorageControlPlane>;
