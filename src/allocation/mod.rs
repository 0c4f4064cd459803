//! Allocation
//!
//! Template matching against the inventory and the two-phase composition
//! of a node: blade reservation, then remote storage.

mod composer;
pub mod matcher;
mod remote_target;

pub use composer::{NodeComposer, RemoteDriveAllocation};
pub use matcher::{
    HostMatcher, LocalDriveMatcher, MemoryMatcher, NetworkInterfaceMatcher, ProcessorMatcher,
};
pub use remote_target::{RemoteTargetSupplier, TargetCreationPlan, DEFAULT_IQN_PREFIX};
