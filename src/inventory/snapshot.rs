//! Inventory Snapshots
//!
//! Serializable dump of every inventory table, used to seed the inventory
//! from a file and to write it back after a run.

use crate::domain::{
    Blade, ComposedNode, LogicalDrive, Manager, RemoteTarget, StorageService,
};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Point-in-time copy of the inventory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySnapshot {
    #[serde(default)]
    pub managers: Vec<Manager>,
    #[serde(default)]
    pub blades: Vec<Blade>,
    #[serde(default)]
    pub storage_services: Vec<StorageService>,
    #[serde(default)]
    pub logical_drives: Vec<LogicalDrive>,
    #[serde(default)]
    pub remote_targets: Vec<RemoteTarget>,
    #[serde(default)]
    pub composed_nodes: Vec<ComposedNode>,
}

impl InventorySnapshot {
    /// Parse a snapshot from YAML (JSON documents are accepted too)
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BladeId, StorageServiceId, VolumeMode};

    const SNAPSHOT: &str = r#"
managers:
  - id: 1
    name: pod-manager
blades:
  - id: 1
    name: blade-1
    location: "Pod=1,Rack=1,Drawer=1,Blade=1"
    serviceUri: "https://10.0.1.1:8443"
    sourceUri: "/redfish/v1/Systems/1"
    managers: [1]
    processors:
      - id: 1
        model: E5
        instructionSet: x86-64
        totalCores: 8
        maxSpeedMhz: 3000
    memory:
      - id: 1
        memoryType: DDR4
        sizeGib: 16
        speedMhz: 2133
storageServices:
  - id: 1
    name: rss-1
    baseUri: "https://10.0.2.1:8443"
    sourceUri: "/redfish/v1/Services/1"
logicalDrives:
  - id: 1
    storageService: 1
    sourceUri: "/redfish/v1/Services/1/LogicalDrives/1"
    mode: LVG
    capacityGb: 500
"#;

    #[test]
    fn test_snapshot_from_yaml() {
        let snapshot = InventorySnapshot::from_yaml(SNAPSHOT).unwrap();
        assert_eq!(snapshot.blades.len(), 1);
        assert_eq!(snapshot.blades[0].id, BladeId(1));
        assert!(!snapshot.blades[0].allocated);
        assert_eq!(snapshot.storage_services[0].id, StorageServiceId(1));
        assert_eq!(snapshot.logical_drives[0].mode, VolumeMode::Lvg);
        assert!(snapshot.remote_targets.is_empty());
    }

    #[test]
    fn test_snapshot_save_and_reload() {
        let snapshot = InventorySnapshot::from_yaml(SNAPSHOT).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yaml");

        snapshot.save(&path).unwrap();
        let reloaded = InventorySnapshot::from_file(&path).unwrap();
        assert_eq!(reloaded, snapshot);
    }

    #[test]
    fn test_snapshot_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = InventorySnapshot::from_file(dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(crate::error::Error::Io(_))));
    }
}
