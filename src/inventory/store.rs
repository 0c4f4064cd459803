//! Inventory Store
//!
//! In-memory tables for the pooled hardware, storage assets and composed
//! nodes. All mutation goes through `Inventory::unit_of_work`, which runs
//! against a private working copy and commits it atomically. Holding the
//! inventory lock for the whole unit makes units serializable, so two
//! allocations can never reserve the same blade or remote target.

use super::events::InventoryEvent;
use super::snapshot::InventorySnapshot;
use crate::domain::{
    Blade, BladeId, ComposedNode, ComposedNodeId, ComposedNodeState, LogicalDrive,
    LogicalDriveId, Manager, ManagerId, RemoteTarget, RemoteTargetId, StorageService,
    StorageServiceId, VolumeMode,
};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// =============================================================================
// Tables
// =============================================================================

/// Every inventory table, in insertion (pool) order
#[derive(Debug, Clone, Default)]
pub struct InventoryTables {
    managers: IndexMap<ManagerId, Manager>,
    blades: IndexMap<BladeId, Blade>,
    storage_services: IndexMap<StorageServiceId, StorageService>,
    logical_drives: IndexMap<LogicalDriveId, LogicalDrive>,
    remote_targets: IndexMap<RemoteTargetId, RemoteTarget>,
    composed_nodes: IndexMap<ComposedNodeId, ComposedNode>,
}

fn lookup<'a, K, V>(table: &'a IndexMap<K, V>, kind: &'static str, id: &K) -> Result<&'a V>
where
    K: Hash + Eq + std::fmt::Display,
{
    table.get(id).ok_or_else(|| Error::not_found(kind, id))
}

fn lookup_mut<'a, K, V>(
    table: &'a mut IndexMap<K, V>,
    kind: &'static str,
    id: &K,
) -> Result<&'a mut V>
where
    K: Hash + Eq + std::fmt::Display,
{
    table.get_mut(id).ok_or_else(|| Error::not_found(kind, id))
}

fn insert_new<K, V>(table: &mut IndexMap<K, V>, kind: &'static str, id: K, value: V) -> Result<()>
where
    K: Hash + Eq + std::fmt::Display,
{
    if table.contains_key(&id) {
        return Err(Error::DuplicateEntity {
            kind,
            id: id.to_string(),
        });
    }
    table.insert(id, value);
    Ok(())
}

impl InventoryTables {
    pub fn blade(&self, id: BladeId) -> Result<&Blade> {
        lookup(&self.blades, "blade", &id)
    }

    pub fn blades(&self) -> impl Iterator<Item = &Blade> {
        self.blades.values()
    }

    /// Blades with `allocated == false`, in pool order
    pub fn unallocated_blades(&self) -> Vec<&Blade> {
        self.blades.values().filter(|b| !b.allocated).collect()
    }

    /// Live node other than `except` that links `blade`
    pub fn blade_holder(&self, blade: BladeId, except: ComposedNodeId) -> Option<ComposedNodeId> {
        self.live_nodes_except(except)
            .find(|node| node.blade == Some(blade))
            .map(|node| node.id)
    }

    /// Live node other than `except` that links `target`
    pub fn target_holder(
        &self,
        target: RemoteTargetId,
        except: ComposedNodeId,
    ) -> Option<ComposedNodeId> {
        self.live_nodes_except(except)
            .find(|node| node.remote_targets.contains(&target))
            .map(|node| node.id)
    }

    fn live_nodes_except(&self, except: ComposedNodeId) -> impl Iterator<Item = &ComposedNode> {
        self.composed_nodes
            .values()
            .filter(move |node| node.id != except && node.state != ComposedNodeState::Released)
    }

    pub fn composed_node(&self, id: ComposedNodeId) -> Result<&ComposedNode> {
        lookup(&self.composed_nodes, "composed node", &id)
    }

    pub fn composed_nodes(&self) -> impl Iterator<Item = &ComposedNode> {
        self.composed_nodes.values()
    }

    pub fn remote_target(&self, id: RemoteTargetId) -> Result<&RemoteTarget> {
        lookup(&self.remote_targets, "remote target", &id)
    }

    pub fn remote_targets(&self) -> impl Iterator<Item = &RemoteTarget> {
        self.remote_targets.values()
    }

    pub fn unallocated_remote_targets(&self) -> Vec<&RemoteTarget> {
        self.remote_targets.values().filter(|t| !t.allocated).collect()
    }

    /// Targets with an address record carrying `iqn`, allocated or not
    pub fn remote_targets_with_iqn(&self, iqn: &str) -> Vec<&RemoteTarget> {
        self.remote_targets
            .values()
            .filter(|t| t.advertises(iqn))
            .collect()
    }

    pub fn storage_service(&self, id: StorageServiceId) -> Result<&StorageService> {
        lookup(&self.storage_services, "storage service", &id)
    }

    pub fn logical_drive(&self, id: LogicalDriveId) -> Result<&LogicalDrive> {
        lookup(&self.logical_drives, "logical drive", &id)
    }

    /// Logical drives hosted by a storage service, in pool order
    pub fn logical_drives_of(&self, service: StorageServiceId) -> Vec<&LogicalDrive> {
        self.logical_drives
            .values()
            .filter(|d| d.storage_service == service)
            .collect()
    }

    /// Free space of a volume group: capacity minus every volume carved from it
    pub fn free_capacity_gb(&self, group: &LogicalDrive) -> u64 {
        let used: u64 = group
            .used_by
            .iter()
            .filter_map(|id| self.logical_drives.get(id))
            .map(|d| d.capacity_gb)
            .sum();
        group.capacity_gb.saturating_sub(used)
    }

    /// Volume groups of a storage service
    pub fn volume_groups_of(&self, service: StorageServiceId) -> Vec<&LogicalDrive> {
        self.logical_drives_of(service)
            .into_iter()
            .filter(|d| d.mode == VolumeMode::Lvg)
            .collect()
    }

    /// Absolute address of a remote target
    pub fn target_address(&self, target: &RemoteTarget) -> Result<String> {
        self.storage_service(target.storage_service)?
            .resolve(&target.source_uri)
    }

    pub fn to_snapshot(&self) -> InventorySnapshot {
        InventorySnapshot {
            managers: self.managers.values().cloned().collect(),
            blades: self.blades.values().cloned().collect(),
            storage_services: self.storage_services.values().cloned().collect(),
            logical_drives: self.logical_drives.values().cloned().collect(),
            remote_targets: self.remote_targets.values().cloned().collect(),
            composed_nodes: self.composed_nodes.values().cloned().collect(),
        }
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

/// Working copy of the inventory, committed as a whole or not at all
#[derive(Debug)]
pub struct UnitOfWork {
    tables: InventoryTables,
    events: Vec<InventoryEvent>,
}

impl Deref for UnitOfWork {
    type Target = InventoryTables;

    fn deref(&self) -> &Self::Target {
        &self.tables
    }
}

impl UnitOfWork {
    pub fn blade_mut(&mut self, id: BladeId) -> Result<&mut Blade> {
        lookup_mut(&mut self.tables.blades, "blade", &id)
    }

    pub fn composed_node_mut(&mut self, id: ComposedNodeId) -> Result<&mut ComposedNode> {
        lookup_mut(&mut self.tables.composed_nodes, "composed node", &id)
    }

    pub fn remote_target_mut(&mut self, id: RemoteTargetId) -> Result<&mut RemoteTarget> {
        lookup_mut(&mut self.tables.remote_targets, "remote target", &id)
    }

    /// Create a composed node in the ALLOCATING state
    pub fn create_composed_node(&mut self, name: &str) -> &mut ComposedNode {
        let id = ComposedNodeId(
            self.tables
                .composed_nodes
                .keys()
                .map(|id| id.0)
                .max()
                .unwrap_or(0)
                + 1,
        );
        self.tables
            .composed_nodes
            .entry(id)
            .or_insert_with(|| ComposedNode::new(id, name))
    }

    /// Move a composed node to a new lifecycle state
    pub fn set_node_state(&mut self, id: ComposedNodeId, state: ComposedNodeState) -> Result<()> {
        let node = self.composed_node_mut(id)?;
        let from = node.state;
        if from == state {
            return Ok(());
        }
        node.state = state;
        node.touch();
        self.events.push(InventoryEvent::NodeStateChanged {
            node_id: id,
            from,
            to: state,
        });
        Ok(())
    }

    pub fn add_manager(&mut self, manager: Manager) -> Result<()> {
        insert_new(&mut self.tables.managers, "manager", manager.id, manager)
    }

    pub fn add_blade(&mut self, blade: Blade) -> Result<()> {
        let blade_id = blade.id;
        insert_new(&mut self.tables.blades, "blade", blade_id, blade)?;
        self.events.push(InventoryEvent::BladeAdded { blade_id });
        Ok(())
    }

    pub fn add_storage_service(&mut self, service: StorageService) -> Result<()> {
        insert_new(
            &mut self.tables.storage_services,
            "storage service",
            service.id,
            service,
        )
    }

    pub fn add_logical_drive(&mut self, drive: LogicalDrive) -> Result<()> {
        self.storage_service(drive.storage_service)?;
        insert_new(&mut self.tables.logical_drives, "logical drive", drive.id, drive)
    }

    /// Record a discovered remote target; consumers are notified after commit
    pub fn add_remote_target(&mut self, target: RemoteTarget) -> Result<()> {
        self.storage_service(target.storage_service)?;
        let target_id = target.id;
        insert_new(&mut self.tables.remote_targets, "remote target", target_id, target)?;
        self.events
            .push(InventoryEvent::RemoteTargetCreated { target_id });
        Ok(())
    }

    fn add_composed_node(&mut self, node: ComposedNode) -> Result<()> {
        insert_new(&mut self.tables.composed_nodes, "composed node", node.id, node)
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Shared inventory with post-commit event publication
pub struct Inventory {
    tables: Mutex<InventoryTables>,
    event_sender: broadcast::Sender<InventoryEvent>,
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("Inventory")
            .field("blades", &tables.blades.len())
            .field("remote_targets", &tables.remote_targets.len())
            .field("composed_nodes", &tables.composed_nodes.len())
            .finish()
    }
}

impl Inventory {
    /// Create an empty inventory
    pub fn new(event_capacity: usize) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(event_capacity.max(1));
        Arc::new(Self {
            tables: Mutex::new(InventoryTables::default()),
            event_sender,
        })
    }

    /// Create an inventory seeded from a snapshot. No events are published.
    pub fn from_snapshot(snapshot: InventorySnapshot, event_capacity: usize) -> Result<Arc<Self>> {
        let mut uow = UnitOfWork {
            tables: InventoryTables::default(),
            events: Vec::new(),
        };
        for manager in snapshot.managers {
            uow.add_manager(manager)?;
        }
        for blade in snapshot.blades {
            uow.add_blade(blade)?;
        }
        for service in snapshot.storage_services {
            uow.add_storage_service(service)?;
        }
        for drive in snapshot.logical_drives {
            uow.add_logical_drive(drive)?;
        }
        for target in snapshot.remote_targets {
            uow.add_remote_target(target)?;
        }
        for node in snapshot.composed_nodes {
            uow.add_composed_node(node)?;
        }

        let inventory = Self::new(event_capacity);
        *inventory.tables.lock() = uow.tables;
        Ok(inventory)
    }

    /// Run `work` as one atomic unit. `Ok` commits the working copy and
    /// publishes its events, `Err` discards both.
    pub fn unit_of_work<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T>,
    {
        let mut tables = self.tables.lock();
        let mut uow = UnitOfWork {
            tables: tables.clone(),
            events: Vec::new(),
        };

        let output = work(&mut uow)?;

        *tables = uow.tables;
        // Published under the lock so subscribers see events in commit order
        for event in uow.events {
            debug!("Publishing inventory event: {:?}", event);
            let _ = self.event_sender.send(event);
        }
        Ok(output)
    }

    /// Read committed state
    pub fn read<T>(&self, reader: impl FnOnce(&InventoryTables) -> T) -> T {
        let tables = self.tables.lock();
        reader(&*tables)
    }

    /// Subscribe to post-commit events
    pub fn subscribe(&self) -> broadcast::Receiver<InventoryEvent> {
        self.event_sender.subscribe()
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        self.tables.lock().to_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blade, lvg, remote_target, storage_service, volume};
    use assert_matches::assert_matches;

    #[test]
    fn test_unit_of_work_commits_on_ok() {
        let inventory = Inventory::new(16);
        inventory
            .unit_of_work(|uow| uow.add_blade(blade(1)))
            .unwrap();

        let count = inventory.read(|t| t.blades().count());
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unit_of_work_discards_on_err() {
        let inventory = Inventory::new(16);
        inventory.unit_of_work(|uow| uow.add_blade(blade(1))).unwrap();

        let result: Result<()> = inventory.unit_of_work(|uow| {
            uow.blade_mut(BladeId(1))?.allocated = true;
            uow.add_blade(blade(2))?;
            Err(Error::Allocation("abort".into()))
        });
        assert!(result.is_err());

        inventory.read(|t| {
            assert!(!t.blade(BladeId(1)).unwrap().allocated);
            assert!(t.blade(BladeId(2)).is_err());
        });
    }

    #[test]
    fn test_working_copy_identity_within_unit() {
        let inventory = Inventory::new(16);
        inventory
            .unit_of_work(|uow| {
                uow.add_blade(blade(1))?;
                uow.blade_mut(BladeId(1))?.allocated = true;
                assert!(uow.blade(BladeId(1))?.allocated);
                assert!(uow.unallocated_blades().is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_events_published_after_commit_only() {
        let inventory = Inventory::new(16);
        let mut events = inventory.subscribe();

        let _ = inventory.unit_of_work(|uow| -> Result<()> {
            uow.add_blade(blade(1))?;
            Err(Error::Internal("rollback".into()))
        });
        assert_matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        );

        inventory
            .unit_of_work(|uow| {
                uow.add_storage_service(storage_service(1))?;
                uow.add_remote_target(remote_target(7, 1, "iqn.2016-01.test:7"))
            })
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            InventoryEvent::RemoteTargetCreated {
                target_id: RemoteTargetId(7)
            }
        );
    }

    #[test]
    fn test_node_state_change_emits_once() {
        let inventory = Inventory::new(16);
        let mut events = inventory.subscribe();

        let node_id = inventory
            .unit_of_work(|uow| Ok(uow.create_composed_node("node").id))
            .unwrap();
        inventory
            .unit_of_work(|uow| {
                uow.set_node_state(node_id, ComposedNodeState::Allocated)?;
                uow.set_node_state(node_id, ComposedNodeState::Allocated)
            })
            .unwrap();

        assert_matches!(
            events.try_recv(),
            Ok(InventoryEvent::NodeStateChanged {
                to: ComposedNodeState::Allocated,
                ..
            })
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_composed_node_ids_increase() {
        let inventory = Inventory::new(16);
        let first = inventory
            .unit_of_work(|uow| Ok(uow.create_composed_node("a").id))
            .unwrap();
        let second = inventory
            .unit_of_work(|uow| Ok(uow.create_composed_node("b").id))
            .unwrap();
        assert_eq!(first, ComposedNodeId(1));
        assert_eq!(second, ComposedNodeId(2));
    }

    #[test]
    fn test_free_capacity_accounts_for_used_by() {
        let mut group = lvg(10, 1, 100);
        group.used_by = vec![LogicalDriveId(11), LogicalDriveId(12)];
        let snapshot = InventorySnapshot {
            storage_services: vec![storage_service(1)],
            logical_drives: vec![group, volume(11, 1, 30), volume(12, 1, 50)],
            ..Default::default()
        };
        let inventory = Inventory::from_snapshot(snapshot, 16).unwrap();

        inventory.read(|t| {
            let group = t.logical_drive(LogicalDriveId(10)).unwrap();
            assert_eq!(t.free_capacity_gb(group), 20);
            assert_eq!(t.volume_groups_of(StorageServiceId(1)).len(), 1);
        });
    }

    #[test]
    fn test_duplicate_and_missing_entities() {
        let inventory = Inventory::new(16);
        let result = inventory.unit_of_work(|uow| {
            uow.add_blade(blade(1))?;
            uow.add_blade(blade(1))
        });
        assert_matches!(result, Err(Error::DuplicateEntity { kind: "blade", .. }));

        let result = inventory.unit_of_work(|uow| {
            uow.add_remote_target(remote_target(1, 9, "iqn.2016-01.test:1"))
        });
        assert_matches!(
            result,
            Err(Error::EntityNotFound {
                kind: "storage service",
                ..
            })
        );
    }

    #[test]
    fn test_target_address_resolution() {
        let snapshot = InventorySnapshot {
            storage_services: vec![storage_service(1)],
            remote_targets: vec![remote_target(3, 1, "iqn.2016-01.test:3")],
            ..Default::default()
        };
        let inventory = Inventory::from_snapshot(snapshot, 16).unwrap();
        let address = inventory.read(|t| {
            let target = t.remote_target(RemoteTargetId(3)).unwrap();
            t.target_address(target).unwrap()
        });
        assert_eq!(
            address,
            "https://storage-1.pod.local:8443/redfish/v1/Services/1/Targets/3"
        );
    }
}
