//! Pod Composer - Composed Node Allocation
//!
//! Composes logical nodes out of pooled rack hardware: picks a blade that
//! satisfies a template, settles remote iSCSI storage (existing or newly
//! provisioned on a storage service) and drives the node through assembly
//! and teardown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      ComposedNodeService                             │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐  ┌────────────────────┐  ┌────────────────────┐  │
//! │  │  NodeComposer  │  │   Provisioning     │  │     Lifecycle      │  │
//! │  │  HostMatcher   │  │ Delegate/Reconciler│  │ Assemble/Release   │  │
//! │  └───────┬────────┘  └─────────┬──────────┘  └─────────┬──────────┘  │
//! │          │                     │                       │             │
//! │          └─────────────────────┼───────────────────────┘             │
//! │                                │                                     │
//! │                   ┌────────────┴────────────┐                        │
//! │                   │ Inventory (units of work│                        │
//! │                   │  + post-commit events)  │                        │
//! │                   └─────────────────────────┘                        │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                        Action Adapters                               │
//! │  ┌──────────────────────────────┐  ┌──────────────────────────────┐  │
//! │  │  Storage service (volumes,   │  │  Compute (reset, boot        │  │
//! │  │  iSCSI targets)              │  │  override)                   │  │
//! │  └──────────────────────────────┘  └──────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`allocation`]: Template matching and node composition
//! - [`provisioning`]: Background target creation and reconciliation
//! - [`lifecycle`]: Assembly, disassembly and reset
//! - [`inventory`]: Repository with atomic units of work
//! - [`controlplane`]: HTTP action adapters
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod allocation;
pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod metrics;
pub mod provisioning;
pub mod service;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use allocation::{HostMatcher, NodeComposer, RemoteDriveAllocation, RemoteTargetSupplier};

pub use config::{ComposerConfig, ComputeConfig, ProvisioningConfig, ReconcilerConfig};

pub use controlplane::{HttpComputeActions, HttpStorageControlPlane};

pub use domain::{
    Blade, BladeId, ComposedNode, ComposedNodeId, ComposedNodeState, ComputeActions,
    ComputeActionsRef, RemoteTarget, RemoteTargetId, RequestedNode, ResetType,
    StorageControlPlane, StorageControlPlaneRef,
};

pub use error::{Error, ErrorAction, Result};

pub use inventory::{Inventory, InventoryEvent, InventorySnapshot};

pub use lifecycle::{NodeAssembler, NodeDisassembler, NodeReset};

pub use metrics::ComposerMetrics;

pub use provisioning::{
    ProvisioningHandle, ProvisioningStatus, RemoteTargetCreationDelegate,
    RemoteTargetCreationReconciler,
};

pub use service::{ComposedNodeCreation, ComposedNodeService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
