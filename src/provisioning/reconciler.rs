//! Remote Target Creation Reconciler
//!
//! Owns the pending delegated creations and completes them from two
//! drivers: "remote target created" events published by the inventory, and
//! a periodic sweep. Both run on one loop and share the pending list
//! through a mutex, taken before the inventory lock.

use super::delegate::{ProvisioningHandle, ProvisioningStatus};
use crate::allocation::NodeComposer;
use crate::config::ReconcilerConfig;
use crate::domain::{same_address, ComposedNodeId, ComposedNodeState, RemoteTargetId};
use crate::error::Result;
use crate::inventory::{Inventory, InventoryEvent};
use crate::metrics::{ComposerMetrics, ReconcileOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Delegated Creation
// =============================================================================

/// Pending remote target creation for a composed node
#[derive(Debug, Clone)]
pub struct DelegatedRemoteTargetCreation {
    pub node_id: ComposedNodeId,
    pub handle: ProvisioningHandle,
    pub started_at: DateTime<Utc>,
}

impl DelegatedRemoteTargetCreation {
    pub fn new(node_id: ComposedNodeId, handle: ProvisioningHandle) -> Self {
        Self {
            node_id,
            handle,
            started_at: Utc::now(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.started_at);
        age.to_std().map_or(false, |age| age > timeout)
    }
}

/// What a sweep did with the pending creations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub failed: Vec<ComposedNodeId>,
    pub matched: Vec<ComposedNodeId>,
    pub timed_out: Vec<ComposedNodeId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.failed.is_empty() && self.matched.is_empty() && self.timed_out.is_empty()
    }
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct RemoteTargetCreationReconciler {
    inventory: Arc<Inventory>,
    pending: Mutex<Vec<DelegatedRemoteTargetCreation>>,
    config: ReconcilerConfig,
    metrics: Arc<ComposerMetrics>,
}

impl RemoteTargetCreationReconciler {
    pub fn new(
        inventory: Arc<Inventory>,
        config: ReconcilerConfig,
        metrics: Arc<ComposerMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inventory,
            pending: Mutex::new(Vec::new()),
            config,
            metrics,
        })
    }

    pub fn register(&self, node_id: ComposedNodeId, handle: ProvisioningHandle) {
        let mut pending = self.pending.lock();
        pending.push(DelegatedRemoteTargetCreation::new(node_id, handle));
        self.metrics.set_pending_creations(pending.len());
        debug!("Registered delegated target creation for {}", node_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn pending_nodes(&self) -> Vec<ComposedNodeId> {
        self.pending.lock().iter().map(|c| c.node_id).collect()
    }

    /// Handle a newly committed remote target. At most one pending creation
    /// is completed per target.
    pub fn handle_remote_target_created(
        &self,
        target_id: RemoteTargetId,
    ) -> Result<Option<ComposedNodeId>> {
        let mut pending = self.pending.lock();

        let target_address = self.inventory.read(|tables| -> Result<Option<String>> {
            let target = tables.remote_target(target_id)?;
            if target.allocated {
                return Ok(None);
            }
            tables.target_address(target).map(Some)
        })?;
        let Some(target_address) = target_address else {
            debug!("Remote target {} is already allocated", target_id);
            return Ok(None);
        };

        let Some(index) = pending.iter().position(|creation| {
            creation
                .handle
                .target_address()
                .is_some_and(|address| same_address(&address, &target_address))
        }) else {
            debug!("No pending creation waits for {}", target_address);
            return Ok(None);
        };

        let creation = pending.remove(index);
        self.metrics.set_pending_creations(pending.len());
        drop(pending);

        let allocated = self.complete(creation.node_id, target_id)?;
        Ok(allocated.then_some(creation.node_id))
    }

    /// Periodic sweep: fail nodes whose creation failed, complete nodes whose
    /// target is already in the inventory, and abort creations that took
    /// too long.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut pending = self.pending.lock();
        let timeout = self.config.creation_timeout();

        let mut index = 0;
        while index < pending.len() {
            let creation = &pending[index];
            let node_id = creation.node_id;

            let resolved = match creation.handle.status() {
                ProvisioningStatus::Failed(reason) => {
                    warn!("Target creation for {} failed: {}", node_id, reason);
                    self.fail(node_id, ReconcileOutcome::Failed);
                    report.failed.push(node_id);
                    true
                }
                ProvisioningStatus::Completed(address) => match self.find_target(&address) {
                    Some(target_id) => {
                        info!("Late match of {} for {}", address, node_id);
                        match self.complete(node_id, target_id) {
                            Ok(_) => {
                                report.matched.push(node_id);
                                true
                            }
                            Err(e) => {
                                error!("Could not allocate {} to {}: {}", target_id, node_id, e);
                                false
                            }
                        }
                    }
                    None if timeout.is_some_and(|t| creation.is_timed_out(t)) => {
                        warn!("Target {} for {} never appeared", address, node_id);
                        self.fail(node_id, ReconcileOutcome::TimedOut);
                        report.timed_out.push(node_id);
                        true
                    }
                    None => false,
                },
                ProvisioningStatus::Pending => {
                    if timeout.is_some_and(|t| creation.is_timed_out(t)) {
                        warn!("Target creation for {} timed out", node_id);
                        creation.handle.abort();
                        self.fail(node_id, ReconcileOutcome::TimedOut);
                        report.timed_out.push(node_id);
                        true
                    } else {
                        false
                    }
                }
            };

            if resolved {
                pending.remove(index);
            } else {
                index += 1;
            }
        }

        self.metrics.set_pending_creations(pending.len());
        if !report.is_empty() {
            info!(
                "Sweep resolved {} failed, {} matched, {} timed out creation(s)",
                report.failed.len(),
                report.matched.len(),
                report.timed_out.len()
            );
        }
        report
    }

    /// Drive the reconciler from inventory events and the sweep timer until
    /// `shutdown` is cancelled
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<InventoryEvent>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        info!(
            "Reconciler started (sweep every {:?})",
            self.config.sweep_interval()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
                event = events.recv() => match event {
                    Ok(InventoryEvent::RemoteTargetCreated { target_id }) => {
                        if let Err(e) = self.handle_remote_target_created(target_id) {
                            error!("Failed to reconcile {}: {}", target_id, e);
                        }
                    }
                    Ok(event) => {
                        if let Some(node_id) = event.node_id() {
                            debug!("Observed state change of {}", node_id);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed targets are picked up by the sweep
                        warn!("Reconciler lagged behind {} inventory event(s)", skipped);
                        self.sweep();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        info!("Reconciler stopped");
    }

    /// Subscribe to the inventory and run on a background task
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let events = self.inventory.subscribe();
        tokio::spawn(self.clone().run(events, shutdown))
    }

    /// Allocate the target to the node, unless the node moved on meanwhile.
    /// Returns whether the target was allocated.
    fn complete(&self, node_id: ComposedNodeId, target_id: RemoteTargetId) -> Result<bool> {
        let allocated = self.inventory.unit_of_work(|uow| {
            let state = uow.composed_node(node_id)?.state;
            if state != ComposedNodeState::Allocating {
                return Ok(false);
            }
            NodeComposer::allocate_remote_target(uow, node_id, target_id)?;
            Ok(true)
        })?;

        if allocated {
            info!("Allocated remote target {} to {}", target_id, node_id);
            self.metrics.record_reconciliation(ReconcileOutcome::Matched);
        } else {
            warn!(
                "Composed node {} no longer waits for a target, {} left unallocated",
                node_id, target_id
            );
        }
        Ok(allocated)
    }

    fn fail(&self, node_id: ComposedNodeId, outcome: ReconcileOutcome) {
        let result = self.inventory.unit_of_work(|uow| {
            NodeComposer::handle_remote_target_creation_failure(uow, node_id)
        });
        if let Err(e) = result {
            error!("Could not mark {} as failed: {}", node_id, e);
        }
        self.metrics.record_reconciliation(outcome);
    }

    fn find_target(&self, address: &str) -> Option<RemoteTargetId> {
        self.inventory.read(|tables| {
            tables
                .unallocated_remote_targets()
                .into_iter()
                .find(|target| {
                    tables
                        .target_address(target)
                        .is_ok_and(|resolved| same_address(&resolved, address))
                })
                .map(|target| target.id)
        })
    }
}
