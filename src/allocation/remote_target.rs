//! Remote Target Supplier
//!
//! Decides whether a remote drive spec names an existing target or needs a
//! new one, and plans the creation of new targets on a volume group with
//! enough free space.

use crate::domain::{
    ComposedNodeId, LogicalDriveId, RemoteStorageType, RemoteTargetId, ReplicationMethod,
    RequestedMasterDrive, RequestedRemoteDrive, StorageServiceId,
};
use crate::error::{Error, Result};
use crate::inventory::InventoryTables;
use tracing::debug;

/// IQN prefix for targets created without an explicit address
pub const DEFAULT_IQN_PREFIX: &str = "iqn.2016-01.io.pod-composer";

/// Everything the background creation needs, captured at allocation time
#[derive(Debug, Clone, PartialEq)]
pub struct TargetCreationPlan {
    pub node_id: ComposedNodeId,
    pub storage_service_id: StorageServiceId,
    /// Base URI of the host running the storage service
    pub endpoint: String,
    /// Path of the storage service resource
    pub storage_service: String,
    pub volume_group_id: LogicalDriveId,
    /// Path of the volume group the new volume is carved from
    pub volume_group: String,
    /// Path of the master volume
    pub master_drive: Option<String>,
    pub replication: Option<ReplicationMethod>,
    pub capacity_gb: u64,
    pub target_iqn: String,
}

pub struct RemoteTargetSupplier;

impl RemoteTargetSupplier {
    /// An iSCSI address without a master names a target that already exists
    pub fn is_defining_existing_target(spec: &RequestedRemoteDrive) -> bool {
        spec.address_type == Some(RemoteStorageType::Iscsi)
            && spec.address.is_some()
            && spec.master.is_none()
    }

    /// Check whether any known target, allocated or not, advertises the address
    pub fn target_exists(tables: &InventoryTables, spec: &RequestedRemoteDrive) -> bool {
        spec.address
            .as_deref()
            .map_or(false, |iqn| !tables.remote_targets_with_iqn(iqn).is_empty())
    }

    /// First unallocated target advertising the requested address
    pub fn find_remote_target(
        tables: &InventoryTables,
        spec: &RequestedRemoteDrive,
    ) -> Result<RemoteTargetId> {
        let address = spec.address.as_deref().unwrap_or_default();
        tables
            .unallocated_remote_targets()
            .into_iter()
            .find(|target| target.advertises(address))
            .map(|target| target.id)
            .ok_or_else(|| {
                Error::Allocation(format!(
                    "Specified remote target ({}) was not found",
                    address
                ))
            })
    }

    /// Pick a volume group for a new target and capture the creation plan
    pub fn initialize_new_target_creation(
        tables: &InventoryTables,
        node_id: ComposedNodeId,
        spec: &RequestedRemoteDrive,
    ) -> Result<TargetCreationPlan> {
        let capacity_gb = spec.capacity_gb.ok_or_else(|| {
            Error::Allocation(
                "Unable to create new target, capacity for new drive not defined in template"
                    .into(),
            )
        })?;
        let master = spec.master.as_ref().ok_or_else(|| {
            Error::Allocation(
                "Unable to create new target, no master drive to resolve the storage service"
                    .into(),
            )
        })?;
        let (service_id, master_drive_id) = Self::validate_master(master)?;

        let service = tables.storage_service(service_id).map_err(|_| {
            Error::Allocation(format!(
                "Could not find storage service {} for master drive",
                service_id
            ))
        })?;

        let volume_group = tables
            .volume_groups_of(service.id)
            .into_iter()
            .find(|group| tables.free_capacity_gb(group) >= capacity_gb)
            .ok_or_else(|| {
                Error::Allocation("Unable to create target, no LVGs available".into())
            })?;

        let master_drive = tables.logical_drive(master_drive_id).map_err(|_| {
            Error::Allocation(format!(
                "Unable to create target, master drive {} not found",
                master_drive_id
            ))
        })?;
        if master_drive.storage_service != service.id {
            return Err(Error::Allocation(
                "Unable to create target, Invalid Logical Drive specified as Master Drive".into(),
            ));
        }

        debug!(
            "Planned target for {} on {} ({} GB free)",
            node_id,
            volume_group.id,
            tables.free_capacity_gb(volume_group)
        );

        Ok(TargetCreationPlan {
            node_id,
            storage_service_id: service.id,
            endpoint: service.base_uri.clone(),
            storage_service: service.source_uri.clone(),
            volume_group_id: volume_group.id,
            volume_group: volume_group.source_uri.clone(),
            master_drive: Some(master_drive.source_uri.clone()),
            replication: master.replication,
            capacity_gb,
            target_iqn: spec
                .address
                .clone()
                .unwrap_or_else(|| Self::default_iqn(node_id)),
        })
    }

    pub fn default_iqn(node_id: ComposedNodeId) -> String {
        format!("{}:{}", DEFAULT_IQN_PREFIX, node_id)
    }

    fn validate_master(master: &RequestedMasterDrive) -> Result<(StorageServiceId, LogicalDriveId)> {
        match (&master.address, master.address_type, master.replication) {
            (Some(address), Some(_), Some(_)) => Ok((address.storage_service, address.logical_drive)),
            _ => Err(Error::Allocation(
                "Unable to create target, Invalid Master Drive specified".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MasterDriveAddress, RemoteTarget};
    use crate::inventory::{Inventory, InventorySnapshot};
    use crate::test_support::{lvg, master_spec, remote_target, storage_service, volume};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn pool() -> Arc<Inventory> {
        let mut full = lvg(10, 1, 100);
        full.used_by = vec![LogicalDriveId(12)];
        let snapshot = InventorySnapshot {
            storage_services: vec![storage_service(1), storage_service(2)],
            logical_drives: vec![
                full,
                lvg(11, 1, 500),
                volume(12, 1, 90),
                volume(13, 1, 20),
                volume(20, 2, 20),
            ],
            remote_targets: vec![
                remote_target(1, 1, "iqn.2016-01.test:free"),
                allocated(remote_target(2, 1, "iqn.2016-01.test:taken")),
            ],
            ..Default::default()
        };
        Inventory::from_snapshot(snapshot, 16).unwrap()
    }

    fn allocated(mut target: RemoteTarget) -> RemoteTarget {
        target.allocated = true;
        target
    }

    fn existing(iqn: &str) -> RequestedRemoteDrive {
        RequestedRemoteDrive {
            address_type: Some(RemoteStorageType::Iscsi),
            address: Some(iqn.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_defining_existing_target() {
        assert!(RemoteTargetSupplier::is_defining_existing_target(&existing("iqn.x")));

        let mut with_master = existing("iqn.x");
        with_master.master = Some(master_spec(1, 13));
        assert!(!RemoteTargetSupplier::is_defining_existing_target(&with_master));

        let no_address = RequestedRemoteDrive {
            address_type: Some(RemoteStorageType::Iscsi),
            ..Default::default()
        };
        assert!(!RemoteTargetSupplier::is_defining_existing_target(&no_address));
    }

    #[test]
    fn test_find_remote_target_skips_allocated() {
        let inventory = pool();
        inventory.read(|t| {
            let found = RemoteTargetSupplier::find_remote_target(t, &existing("iqn.2016-01.test:free"));
            assert_eq!(found.unwrap(), RemoteTargetId(1));

            let taken = RemoteTargetSupplier::find_remote_target(t, &existing("iqn.2016-01.test:taken"));
            assert_matches!(taken, Err(Error::Allocation(_)));

            assert!(RemoteTargetSupplier::target_exists(t, &existing("iqn.2016-01.test:taken")));
            assert!(!RemoteTargetSupplier::target_exists(t, &existing("iqn.2016-01.test:new")));
        });
    }

    #[test]
    fn test_new_target_uses_first_group_with_room() {
        let inventory = pool();
        let spec = RequestedRemoteDrive {
            capacity_gb: Some(50),
            address_type: Some(RemoteStorageType::Iscsi),
            master: Some(master_spec(1, 13)),
            ..Default::default()
        };

        let plan = inventory
            .read(|t| RemoteTargetSupplier::initialize_new_target_creation(t, ComposedNodeId(7), &spec))
            .unwrap();
        assert_eq!(plan.volume_group_id, LogicalDriveId(11));
        assert_eq!(plan.endpoint, "https://storage-1.pod.local:8443");
        assert_eq!(plan.storage_service, "/redfish/v1/Services/1");
        assert_eq!(
            plan.master_drive.as_deref(),
            Some("/redfish/v1/Services/1/LogicalDrives/13")
        );
        assert_eq!(plan.target_iqn, "iqn.2016-01.io.pod-composer:node-7");

        let small = RequestedRemoteDrive {
            capacity_gb: Some(10),
            ..spec
        };
        let plan = inventory
            .read(|t| RemoteTargetSupplier::initialize_new_target_creation(t, ComposedNodeId(7), &small))
            .unwrap();
        assert_eq!(plan.volume_group_id, LogicalDriveId(10));
    }

    #[test]
    fn test_new_target_rejections() {
        let inventory = pool();
        let plan = |spec: RequestedRemoteDrive| {
            inventory.read(|t| {
                RemoteTargetSupplier::initialize_new_target_creation(t, ComposedNodeId(1), &spec)
            })
        };

        // No capacity
        let spec = RequestedRemoteDrive {
            master: Some(master_spec(1, 13)),
            ..Default::default()
        };
        assert_matches!(plan(spec), Err(Error::Allocation(_)));

        // Not enough room anywhere
        let spec = RequestedRemoteDrive {
            capacity_gb: Some(1000),
            master: Some(master_spec(1, 13)),
            ..Default::default()
        };
        assert_matches!(plan(spec), Err(Error::Allocation(_)));

        // Master on another storage service
        let spec = RequestedRemoteDrive {
            capacity_gb: Some(10),
            master: Some(master_spec(1, 20)),
            ..Default::default()
        };
        assert_matches!(plan(spec), Err(Error::Allocation(_)));

        // Incomplete master
        let spec = RequestedRemoteDrive {
            capacity_gb: Some(10),
            master: Some(RequestedMasterDrive {
                address: Some(MasterDriveAddress {
                    storage_service: StorageServiceId(1),
                    logical_drive: LogicalDriveId(13),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_matches!(plan(spec), Err(Error::Allocation(_)));

        // No master at all
        let spec = RequestedRemoteDrive {
            capacity_gb: Some(10),
            ..Default::default()
        };
        assert_matches!(plan(spec), Err(Error::Allocation(_)));
    }
}
