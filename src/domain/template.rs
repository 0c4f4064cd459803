//! Allocation Templates - Client requests for a composed node
//!
//! A `RequestedNode` describes the desired components declaratively. Every
//! field is an optional constraint; an absent constraint matches anything.

use crate::domain::model::{
    DriveType, InstructionSet, Location, LogicalDriveId, MemoryType, ProcessorModel,
    RemoteStorageType, ReplicationMethod, StorageServiceId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Template component that may be pinned to a location
pub trait Localizable {
    fn location(&self) -> Option<&Location>;
}

macro_rules! localizable {
    ($($ty:ty),* $(,)?) => {
        $(impl Localizable for $ty {
            fn location(&self) -> Option<&Location> {
                self.location.as_ref()
            }
        })*
    };
}

// =============================================================================
// Requested Node
// =============================================================================

/// Template for a composed node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedNode {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub processors: Vec<RequestedProcessor>,
    #[serde(default)]
    pub memory: Vec<RequestedMemory>,
    #[serde(default)]
    pub local_drives: Vec<RequestedLocalDrive>,
    #[serde(default)]
    pub network_interfaces: Vec<RequestedNetworkInterface>,
    #[serde(default)]
    pub remote_drives: Vec<RequestedRemoteDrive>,
}

impl RequestedNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Distinct locations of the host components. Remote drives live on
    /// storage services elsewhere in the pod and do not pin the blade.
    pub fn distinct_locations(&self) -> BTreeSet<Location> {
        fn locations_of<'a, T: Localizable + 'a>(
            items: &'a [T],
        ) -> impl Iterator<Item = &'a Location> + 'a {
            items.iter().filter_map(Localizable::location)
        }

        locations_of(&self.processors)
            .chain(locations_of(&self.memory))
            .chain(locations_of(&self.local_drives))
            .chain(locations_of(&self.network_interfaces))
            .cloned()
            .collect()
    }

    pub fn requires_remote_drive(&self) -> bool {
        !self.remote_drives.is_empty()
    }

    /// Load a template from a YAML or JSON document
    pub fn from_yaml(text: &str) -> crate::error::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

// =============================================================================
// Component Specs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedProcessor {
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub model: Option<ProcessorModel>,
    #[serde(default)]
    pub instruction_set: Option<InstructionSet>,
    /// Every listed extension must be supported
    #[serde(default)]
    pub instruction_set_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub total_cores: Option<u32>,
    #[serde(default)]
    pub max_speed_mhz: Option<u32>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedMemory {
    /// Aggregate size over all qualifying modules
    #[serde(default)]
    pub size_gib: Option<u64>,
    #[serde(default)]
    pub speed_mhz: Option<u32>,
    #[serde(default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedLocalDrive {
    #[serde(default)]
    pub capacity_gb: Option<u64>,
    #[serde(default)]
    pub drive_type: Option<DriveType>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedNetworkInterface {
    #[serde(default)]
    pub speed_mbps: Option<u32>,
    #[serde(default)]
    pub location: Option<Location>,
}

// =============================================================================
// Remote Drive
// =============================================================================

/// Remote drive, either an existing target or a new one to provision
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedRemoteDrive {
    /// Capacity of a new volume in GB
    #[serde(default)]
    pub capacity_gb: Option<u64>,
    #[serde(default)]
    pub address_type: Option<RemoteStorageType>,
    /// Target IQN
    #[serde(default)]
    pub address: Option<String>,
    /// Source volume for a new target
    #[serde(default)]
    pub master: Option<RequestedMasterDrive>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedMasterDrive {
    #[serde(default, rename = "type")]
    pub replication: Option<ReplicationMethod>,
    #[serde(default)]
    pub address_type: Option<RemoteStorageType>,
    #[serde(default)]
    pub address: Option<MasterDriveAddress>,
}

/// Logical drive within a storage service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterDriveAddress {
    pub storage_service: StorageServiceId,
    pub logical_drive: LogicalDriveId,
}

localizable!(
    RequestedProcessor,
    RequestedMemory,
    RequestedLocalDrive,
    RequestedNetworkInterface,
    RequestedRemoteDrive,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_locations_across_specs() {
        let rack1: Location = "Pod=1,Rack=1".parse().unwrap();
        let mut template = RequestedNode::new("node");
        template.processors.push(RequestedProcessor {
            location: Some(rack1.clone()),
            ..Default::default()
        });
        template.memory.push(RequestedMemory {
            location: Some(rack1.clone()),
            ..Default::default()
        });
        assert_eq!(template.distinct_locations().len(), 1);

        template.remote_drives.push(RequestedRemoteDrive {
            location: Some("Pod=1,Rack=2".parse().unwrap()),
            ..Default::default()
        });
        assert_eq!(template.distinct_locations(), BTreeSet::from([rack1]));

        template.network_interfaces.push(RequestedNetworkInterface {
            location: Some("Pod=1,Rack=3".parse().unwrap()),
            ..Default::default()
        });
        assert_eq!(template.distinct_locations().len(), 2);
    }

    #[test]
    fn test_template_from_yaml() {
        let yaml = r#"
name: web-01
processors:
  - totalCores: 4
    instructionSetExtensions: ["x86-64", "avx2"]
memory:
  - sizeGib: 8
    memoryType: DDR4
localDrives:
  - capacityGb: 100
    driveType: SSD
    location: "Pod=1,Rack=1"
remoteDrives:
  - capacityGb: 20
    addressType: iSCSI
    master:
      type: snapshot
      addressType: iSCSI
      address:
        storageService: 1
        logicalDrive: 4
"#;
        let template = RequestedNode::from_yaml(yaml).unwrap();
        assert_eq!(template.name, "web-01");
        assert_eq!(template.processors[0].total_cores, Some(4));
        assert_eq!(template.memory[0].memory_type, Some(MemoryType::Ddr4));
        assert_eq!(template.local_drives[0].drive_type, Some(DriveType::Ssd));

        let master = template.remote_drives[0].master.as_ref().unwrap();
        assert_eq!(master.replication, Some(ReplicationMethod::Snapshot));
        assert_eq!(
            master.address,
            Some(MasterDriveAddress {
                storage_service: StorageServiceId(1),
                logical_drive: LogicalDriveId(4),
            })
        );
        assert!(template.requires_remote_drive());
    }
}
