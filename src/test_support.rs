//! Shared fixtures and recording fakes for unit tests

use crate::allocation::NodeComposer;
use crate::config::ReconcilerConfig;
use crate::domain::*;
use crate::error::{Error, Result};
use crate::inventory::{Inventory, InventorySnapshot};
use crate::metrics::ComposerMetrics;
use crate::provisioning::{RemoteTargetCreationDelegate, RemoteTargetCreationReconciler};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Components
// =============================================================================

pub fn processor(id: u64, total_cores: u32, max_speed_mhz: u32) -> Processor {
    Processor {
        id: ProcessorId(id),
        socket: Some(format!("CPU{}", id % 100)),
        model: None,
        instruction_set: None,
        instruction_set_extensions: Vec::new(),
        total_cores,
        max_speed_mhz,
    }
}

pub fn memory(id: u64, size_gib: u64, speed_mhz: u32) -> Memory {
    Memory {
        id: MemoryId(id),
        memory_type: None,
        size_gib,
        speed_mhz,
    }
}

fn ddr4(id: u64, size_gib: u64) -> Memory {
    Memory {
        memory_type: Some(MemoryType::Ddr4),
        ..memory(id, size_gib, 2133)
    }
}

pub fn drive(id: u64, drive_type: DriveType, capacity_gb: u64) -> Drive {
    Drive {
        id: DriveId(id),
        drive_type: Some(drive_type),
        capacity_gb,
        serial_number: None,
    }
}

pub fn nic(id: u64, speed_mbps: u32) -> NetworkInterface {
    NetworkInterface {
        id: NetworkInterfaceId(id),
        mac_address: None,
        speed_mbps,
    }
}

// =============================================================================
// Blades
// =============================================================================

fn bare_blade(id: u64) -> Blade {
    Blade {
        id: BladeId(id),
        name: format!("blade-{}", id),
        location: None,
        service_uri: "https://rack-1.pod.local:8443".into(),
        source_uri: format!("/redfish/v1/Systems/{}", id),
        processors: Vec::new(),
        memory: Vec::new(),
        storage_controllers: Vec::new(),
        network_interfaces: Vec::new(),
        managers: vec![ManagerId(1)],
        allocated: false,
    }
}

/// Small blade: 4 cores, 8 GiB DDR4, one 500 GB HDD, one 1 GbE NIC
pub fn blade(id: u64) -> Blade {
    let base = id * 100;
    Blade {
        processors: vec![processor(base + 1, 4, 2400)],
        memory: vec![ddr4(base + 1, 8)],
        storage_controllers: vec![StorageController {
            name: Some("sata".into()),
            drives: vec![drive(base + 1, DriveType::Hdd, 500)],
        }],
        network_interfaces: vec![nic(base + 1, 1_000)],
        ..bare_blade(id)
    }
}

/// 8 cores, 2x8 GiB DDR4, 2x160 GB SSD, 2 NICs
pub fn example_blade(id: u64) -> Blade {
    let base = id * 100;
    Blade {
        location: Some(Location::new([("Pod", 1), ("Rack", 1)])),
        processors: vec![processor(base + 1, 8, 2600)],
        memory: vec![ddr4(base + 1, 8), ddr4(base + 2, 8)],
        storage_controllers: vec![StorageController {
            name: Some("nvme".into()),
            drives: vec![
                drive(base + 1, DriveType::Ssd, 160),
                drive(base + 2, DriveType::Ssd, 160),
            ],
        }],
        network_interfaces: vec![nic(base + 1, 10_000), nic(base + 2, 10_000)],
        ..bare_blade(id)
    }
}

/// At least 4 cores, 8 GiB DDR4, two SSDs of 100 GB or more
pub fn example_template() -> RequestedNode {
    let ssd = RequestedLocalDrive {
        capacity_gb: Some(100),
        drive_type: Some(DriveType::Ssd),
        location: None,
    };
    RequestedNode {
        processors: vec![RequestedProcessor {
            total_cores: Some(4),
            ..Default::default()
        }],
        memory: vec![RequestedMemory {
            size_gib: Some(8),
            memory_type: Some(MemoryType::Ddr4),
            ..Default::default()
        }],
        local_drives: vec![ssd.clone(), ssd],
        ..RequestedNode::new("example")
    }
}

// =============================================================================
// Storage
// =============================================================================

pub fn storage_service(id: u64) -> StorageService {
    StorageService {
        id: StorageServiceId(id),
        name: format!("storage-{}", id),
        base_uri: format!("https://storage-{}.pod.local:8443", id),
        source_uri: format!("/redfish/v1/Services/{}", id),
    }
}

fn logical_drive(id: u64, service: u64, mode: VolumeMode, capacity_gb: u64) -> LogicalDrive {
    LogicalDrive {
        id: LogicalDriveId(id),
        storage_service: StorageServiceId(service),
        source_uri: format!("/redfish/v1/Services/{}/LogicalDrives/{}", service, id),
        mode,
        capacity_gb,
        used_by: Vec::new(),
        snapshot: false,
    }
}

pub fn lvg(id: u64, service: u64, capacity_gb: u64) -> LogicalDrive {
    logical_drive(id, service, VolumeMode::Lvg, capacity_gb)
}

pub fn volume(id: u64, service: u64, capacity_gb: u64) -> LogicalDrive {
    logical_drive(id, service, VolumeMode::Lv, capacity_gb)
}

pub fn remote_target(id: u64, service: u64, iqn: &str) -> RemoteTarget {
    RemoteTarget {
        id: RemoteTargetId(id),
        storage_service: StorageServiceId(service),
        source_uri: format!("/redfish/v1/Services/{}/Targets/{}", service, id),
        addresses: vec![IscsiAddress {
            target_iqn: iqn.to_string(),
            target_portal_ip: None,
            target_portal_port: None,
        }],
        logical_drives: Vec::new(),
        allocated: false,
    }
}

/// Snapshot master on the given storage service
pub fn master_spec(service: u64, logical_drive: u64) -> RequestedMasterDrive {
    RequestedMasterDrive {
        replication: Some(ReplicationMethod::Snapshot),
        address_type: Some(RemoteStorageType::Iscsi),
        address: Some(MasterDriveAddress {
            storage_service: StorageServiceId(service),
            logical_drive: LogicalDriveId(logical_drive),
        }),
    }
}

// =============================================================================
// Composed Nodes
// =============================================================================

pub fn allocating_node(id: u64) -> ComposedNode {
    ComposedNode::new(ComposedNodeId(id), format!("node-{}", id))
}

/// Node linked to `blade`, in the given state
pub fn assigned_node(id: u64, blade: &Blade, state: ComposedNodeState) -> ComposedNode {
    let mut node = allocating_node(id);
    node.link_blade(blade);
    node.state = state;
    node
}

// =============================================================================
// Fakes
// =============================================================================

/// Storage control plane that answers from memory and records requests
pub struct FakeControlPlane {
    volume_requests: Mutex<Vec<LogicalVolumeCreationRequest>>,
    target_requests: Mutex<Vec<RemoteTargetCreationRequest>>,
    next_volume: AtomicU64,
    next_target: AtomicU64,
    fail_volumes: AtomicBool,
    fail_targets: AtomicBool,
    delay: Mutex<Duration>,
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self {
            volume_requests: Mutex::new(Vec::new()),
            target_requests: Mutex::new(Vec::new()),
            next_volume: AtomicU64::new(100),
            next_target: AtomicU64::new(100),
            fail_volumes: AtomicBool::new(false),
            fail_targets: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
        }
    }
}

impl FakeControlPlane {
    pub fn volume_requests(&self) -> Vec<LogicalVolumeCreationRequest> {
        self.volume_requests.lock().clone()
    }

    pub fn target_requests(&self) -> Vec<RemoteTargetCreationRequest> {
        self.target_requests.lock().clone()
    }

    pub fn fail_volumes(&self) {
        self.fail_volumes.store(true, Ordering::SeqCst);
    }

    pub fn fail_targets(&self) {
        self.fail_targets.store(true, Ordering::SeqCst);
    }

    /// Delay every volume creation
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl StorageControlPlane for FakeControlPlane {
    async fn create_logical_volume(
        &self,
        endpoint: &str,
        storage_service: &str,
        request: LogicalVolumeCreationRequest,
    ) -> Result<String> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_volumes.load(Ordering::SeqCst) {
            return Err(Error::ControlPlaneAction {
                operation: "create logical drive".into(),
                reason: "drive became absent during creation".into(),
            });
        }
        self.volume_requests.lock().push(request);
        let id = self.next_volume.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}{}/LogicalDrives/{}", endpoint, storage_service, id))
    }

    async fn create_target(
        &self,
        endpoint: &str,
        storage_service: &str,
        request: RemoteTargetCreationRequest,
    ) -> Result<String> {
        if self.fail_targets.load(Ordering::SeqCst) {
            return Err(Error::ControlPlaneAction {
                operation: "create target".into(),
                reason: "HTTP 500".into(),
            });
        }
        self.target_requests.lock().push(request);
        let id = self.next_target.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}{}/Targets/{}", endpoint, storage_service, id))
    }
}

/// Compute action performed by `FakeCompute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCall {
    Reset(BladeId, ResetType),
    BootOverride(BladeId, BootSourceType),
}

/// Compute actions recording every successful call
#[derive(Default)]
pub struct FakeCompute {
    calls: Mutex<Vec<ComputeCall>>,
    failing_resets: Mutex<Vec<ResetType>>,
    fail_boot_override: AtomicBool,
}

impl FakeCompute {
    pub fn calls(&self) -> Vec<ComputeCall> {
        self.calls.lock().clone()
    }

    pub fn fail_reset(&self, reset_type: ResetType) {
        self.failing_resets.lock().push(reset_type);
    }

    pub fn fail_boot_override(&self) {
        self.fail_boot_override.store(true, Ordering::SeqCst);
    }

    fn failure(blade: &Blade, action: impl ToString) -> Error {
        Error::ComputeAction {
            blade: blade.id.to_string(),
            action: action.to_string(),
            reason: "HTTP 500".into(),
        }
    }
}

#[async_trait]
impl ComputeActions for FakeCompute {
    async fn reset(&self, blade: &Blade, reset_type: ResetType) -> Result<()> {
        if self.failing_resets.lock().contains(&reset_type) {
            return Err(Self::failure(blade, reset_type));
        }
        self.calls
            .lock()
            .push(ComputeCall::Reset(blade.id, reset_type));
        Ok(())
    }

    async fn override_boot_source_permanently(
        &self,
        blade: &Blade,
        boot_source: BootSourceType,
    ) -> Result<()> {
        if self.fail_boot_override.load(Ordering::SeqCst) {
            return Err(Self::failure(blade, "boot override"));
        }
        self.calls
            .lock()
            .push(ComputeCall::BootOverride(blade.id, boot_source));
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Composer wired to an inventory and the fakes
pub struct Harness {
    pub inventory: Arc<Inventory>,
    pub metrics: Arc<ComposerMetrics>,
    pub reconciler: Arc<RemoteTargetCreationReconciler>,
    pub delegate: Arc<RemoteTargetCreationDelegate>,
    pub composer: NodeComposer,
    pub control_plane: Arc<FakeControlPlane>,
    pub compute: Arc<FakeCompute>,
}

impl Harness {
    pub fn new(snapshot: InventorySnapshot) -> Self {
        Self::with_config(snapshot, ReconcilerConfig::default())
    }

    pub fn with_config(snapshot: InventorySnapshot, config: ReconcilerConfig) -> Self {
        let inventory = Inventory::from_snapshot(snapshot, 64).unwrap();
        let metrics = Arc::new(ComposerMetrics::new().unwrap());
        let control_plane = Arc::new(FakeControlPlane::default());
        let reconciler =
            RemoteTargetCreationReconciler::new(inventory.clone(), config, metrics.clone());
        let delegate = RemoteTargetCreationDelegate::new(
            inventory.clone(),
            control_plane.clone(),
            reconciler.clone(),
            4,
            None,
        );
        let composer = NodeComposer::new(inventory.clone(), delegate.clone());

        Self {
            inventory,
            metrics,
            reconciler,
            delegate,
            composer,
            control_plane,
            compute: Arc::new(FakeCompute::default()),
        }
    }

    pub fn node(&self, id: ComposedNodeId) -> ComposedNode {
        self.inventory
            .read(|t| t.composed_node(id).cloned())
            .unwrap()
    }

    pub fn blade(&self, id: BladeId) -> Blade {
        self.inventory.read(|t| t.blade(id).cloned()).unwrap()
    }

    pub fn target(&self, id: RemoteTargetId) -> RemoteTarget {
        self.inventory
            .read(|t| t.remote_target(id).cloned())
            .unwrap()
    }

    /// Poll until the node reaches `state`, failing after five seconds
    pub async fn wait_for_state(
        &self,
        id: ComposedNodeId,
        state: ComposedNodeState,
    ) -> ComposedNode {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let node = self.node(id);
                if node.state == state {
                    return node;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap()
    }
}
