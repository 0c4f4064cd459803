//! Domain Model - Pooled hardware and composed node entities
//!
//! Physical assets (blades and their components), storage service assets
//! (logical drives and remote targets) and the composed node built on top.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a physical blade
    BladeId, "blade"
);
entity_id!(ProcessorId, "processor");
entity_id!(MemoryId, "memory");
entity_id!(DriveId, "drive");
entity_id!(NetworkInterfaceId, "nic");
entity_id!(
    /// Identifier of a composed node
    ComposedNodeId, "node"
);
entity_id!(RemoteTargetId, "target");
entity_id!(LogicalDriveId, "logical-drive");
entity_id!(StorageServiceId, "storage-service");
entity_id!(ManagerId, "manager");

// =============================================================================
// Location
// =============================================================================

/// Topological location of an asset, e.g. `Pod=1,Rack=2,Drawer=1,Blade=3`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    coords: BTreeMap<String, u32>,
}

impl Location {
    pub fn new<K: Into<String>>(coords: impl IntoIterator<Item = (K, u32)>) -> Self {
        Self {
            coords: coords.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn coord(&self, name: &str) -> Option<u32> {
        self.coords.get(name).copied()
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut coords = BTreeMap::new();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::InvalidLocation(text.to_string()))?;
            let value = value
                .trim()
                .parse::<u32>()
                .map_err(|_| Error::InvalidLocation(text.to_string()))?;
            coords.insert(key.trim().to_string(), value);
        }
        if coords.is_empty() {
            return Err(Error::InvalidLocation(text.to_string()));
        }
        Ok(Self { coords })
    }
}

impl TryFrom<String> for Location {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self
            .coords
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

// =============================================================================
// Component Classifications
// =============================================================================

/// Processor model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessorModel {
    E3,
    E5,
    E7,
    X3,
    X5,
    X7,
    I3,
    I5,
    I7,
    Unknown,
}

/// Processor instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionSet {
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86-64")]
    X86_64,
    #[serde(rename = "IA-64")]
    Ia64,
    #[serde(rename = "ARM-A32")]
    ArmA32,
    #[serde(rename = "ARM-A64")]
    ArmA64,
    #[serde(rename = "MIPS32")]
    Mips32,
    #[serde(rename = "MIPS64")]
    Mips64,
    #[serde(rename = "OEM")]
    Oem,
}

/// Memory module technology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryType {
    Ddr,
    Ddr2,
    Ddr3,
    Ddr4,
    #[serde(rename = "DDR4_SDRAM")]
    Ddr4Sdram,
    Lpddr3,
    Lpddr4,
}

/// Local drive media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveType {
    #[serde(rename = "HDD")]
    Hdd,
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "NVMe")]
    Nvme,
}

impl std::fmt::Display for DriveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveType::Hdd => write!(f, "HDD"),
            DriveType::Ssd => write!(f, "SSD"),
            DriveType::Nvme => write!(f, "NVMe"),
        }
    }
}

/// Role of a logical drive on a storage service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolumeMode {
    /// Logical volume group, volumes are carved from it
    Lvg,
    /// Logical volume
    Lv,
    /// Physical volume backing a group
    Pv,
}

/// Addressing scheme of a remote drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteStorageType {
    #[serde(rename = "iSCSI")]
    Iscsi,
}

/// How a new volume is derived from its master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMethod {
    Clone,
    Snapshot,
}

/// Boot source used when assembling a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootSourceType {
    Hdd,
    Pxe,
}

impl std::fmt::Display for BootSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootSourceType::Hdd => write!(f, "Hdd"),
            BootSourceType::Pxe => write!(f, "Pxe"),
        }
    }
}

/// Reset action issued to a blade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResetType {
    On,
    ForceOff,
    GracefulShutdown,
    GracefulRestart,
    ForceRestart,
}

impl std::fmt::Display for ResetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetType::On => write!(f, "On"),
            ResetType::ForceOff => write!(f, "ForceOff"),
            ResetType::GracefulShutdown => write!(f, "GracefulShutdown"),
            ResetType::GracefulRestart => write!(f, "GracefulRestart"),
            ResetType::ForceRestart => write!(f, "ForceRestart"),
        }
    }
}

// =============================================================================
// Blade Components
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Processor {
    pub id: ProcessorId,
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default)]
    pub model: Option<ProcessorModel>,
    #[serde(default)]
    pub instruction_set: Option<InstructionSet>,
    #[serde(default)]
    pub instruction_set_extensions: Vec<String>,
    pub total_cores: u32,
    pub max_speed_mhz: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: MemoryId,
    #[serde(default)]
    pub memory_type: Option<MemoryType>,
    pub size_gib: u64,
    pub speed_mhz: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    pub id: DriveId,
    #[serde(default)]
    pub drive_type: Option<DriveType>,
    pub capacity_gb: u64,
    #[serde(default)]
    pub serial_number: Option<String>,
}

/// Storage controller, owner of the blade's local drives
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageController {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub drives: Vec<Drive>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub id: NetworkInterfaceId,
    #[serde(default)]
    pub mac_address: Option<String>,
    pub speed_mbps: u32,
}

// =============================================================================
// Blade
// =============================================================================

/// Physical compute host in the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blade {
    pub id: BladeId,
    pub name: String,
    #[serde(default)]
    pub location: Option<Location>,
    /// Base URI of the agent managing this blade
    pub service_uri: String,
    /// Path of the blade resource on its agent
    pub source_uri: String,
    #[serde(default)]
    pub processors: Vec<Processor>,
    #[serde(default)]
    pub memory: Vec<Memory>,
    #[serde(default)]
    pub storage_controllers: Vec<StorageController>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    /// Managers responsible for the pod this blade lives in
    #[serde(default)]
    pub managers: Vec<ManagerId>,
    #[serde(default)]
    pub allocated: bool,
}

impl Blade {
    /// All local drives, across every storage controller
    pub fn drives(&self) -> impl Iterator<Item = &Drive> {
        self.storage_controllers.iter().flat_map(|c| c.drives.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manager {
    pub id: ManagerId,
    pub name: String,
}

// =============================================================================
// Storage Service Assets
// =============================================================================

/// Remote storage service exposing logical drives and targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageService {
    pub id: StorageServiceId,
    pub name: String,
    /// Base URI of the host running the service
    pub base_uri: String,
    /// Path of the service resource on that host
    pub source_uri: String,
}

impl StorageService {
    /// Resolve a resource path of this service into an absolute address
    pub fn resolve(&self, path: &str) -> Result<String> {
        resolve_address(&self.base_uri, path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalDrive {
    pub id: LogicalDriveId,
    pub storage_service: StorageServiceId,
    pub source_uri: String,
    pub mode: VolumeMode,
    pub capacity_gb: u64,
    /// Volumes carved from this drive (LVG mode)
    #[serde(default)]
    pub used_by: Vec<LogicalDriveId>,
    #[serde(default)]
    pub snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IscsiAddress {
    pub target_iqn: String,
    #[serde(default)]
    pub target_portal_ip: Option<String>,
    #[serde(default)]
    pub target_portal_port: Option<u16>,
}

/// Network storage endpoint, shared pool resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTarget {
    pub id: RemoteTargetId,
    pub storage_service: StorageServiceId,
    pub source_uri: String,
    #[serde(default)]
    pub addresses: Vec<IscsiAddress>,
    #[serde(default)]
    pub logical_drives: Vec<LogicalDriveId>,
    #[serde(default)]
    pub allocated: bool,
}

impl RemoteTarget {
    /// Check whether any address record carries the given IQN
    pub fn advertises(&self, iqn: &str) -> bool {
        self.addresses.iter().any(|a| a.target_iqn == iqn)
    }
}

// =============================================================================
// Composed Node
// =============================================================================

/// Lifecycle state of a composed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComposedNodeState {
    Allocating,
    Allocated,
    PoweredOn,
    PoweredOff,
    Failed,
    /// Host and targets were handed back to the pool
    Released,
}

impl std::fmt::Display for ComposedNodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposedNodeState::Allocating => write!(f, "ALLOCATING"),
            ComposedNodeState::Allocated => write!(f, "ALLOCATED"),
            ComposedNodeState::PoweredOn => write!(f, "POWERED_ON"),
            ComposedNodeState::PoweredOff => write!(f, "POWERED_OFF"),
            ComposedNodeState::Failed => write!(f, "FAILED"),
            ComposedNodeState::Released => write!(f, "RELEASED"),
        }
    }
}

/// Logical node composed from one blade and optional remote storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedNode {
    pub id: ComposedNodeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: ComposedNodeState,
    #[serde(default)]
    pub blade: Option<BladeId>,
    #[serde(default)]
    pub processors: Vec<ProcessorId>,
    #[serde(default)]
    pub memory: Vec<MemoryId>,
    #[serde(default)]
    pub local_drives: Vec<DriveId>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterfaceId>,
    #[serde(default)]
    pub remote_targets: Vec<RemoteTargetId>,
    #[serde(default)]
    pub managers: Vec<ManagerId>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ComposedNode {
    pub fn new(id: ComposedNodeId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            state: ComposedNodeState::Allocating,
            blade: None,
            processors: Vec::new(),
            memory: Vec::new(),
            local_drives: Vec::new(),
            network_interfaces: Vec::new(),
            remote_targets: Vec::new(),
            managers: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Link the blade and every one of its components
    pub fn link_blade(&mut self, blade: &Blade) {
        self.blade = Some(blade.id);
        self.processors = blade.processors.iter().map(|p| p.id).collect();
        self.memory = blade.memory.iter().map(|m| m.id).collect();
        self.network_interfaces = blade.network_interfaces.iter().map(|n| n.id).collect();
        self.local_drives = blade.drives().map(|d| d.id).collect();
        self.managers = blade.managers.clone();
        self.touch();
    }

    /// Drop the blade and its components, keeping remote targets
    pub fn unlink_blade(&mut self) {
        self.blade = None;
        self.processors.clear();
        self.memory.clear();
        self.network_interfaces.clear();
        self.local_drives.clear();
        self.managers.clear();
        self.touch();
    }

    pub fn link_remote_target(&mut self, target: RemoteTargetId) {
        if !self.remote_targets.contains(&target) {
            self.remote_targets.push(target);
        }
        self.touch();
    }

    /// Boot from the network when remote storage is attached
    pub fn boot_source(&self) -> BootSourceType {
        if self.remote_targets.is_empty() {
            BootSourceType::Hdd
        } else {
            BootSourceType::Pxe
        }
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

// =============================================================================
// Addresses
// =============================================================================

/// Resolve `path` against `base`, producing an absolute address
pub fn resolve_address(base: &str, path: &str) -> Result<String> {
    let base = Url::parse(base)
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", base, e)))?;
    let resolved = base
        .join(path)
        .map_err(|e| Error::InvalidAddress(format!("{} + {}: {}", base, path, e)))?;
    Ok(resolved.to_string())
}

/// Compare two addresses, normalizing them when both parse as URLs
pub fn same_address(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
