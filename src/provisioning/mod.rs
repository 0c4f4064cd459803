//! Provisioning
//!
//! Background creation of new remote targets and the reconciler that ties
//! created targets back to the composed nodes waiting for them.

mod delegate;
mod reconciler;

pub use delegate::{ProvisioningHandle, ProvisioningStatus, RemoteTargetCreationDelegate};
pub use reconciler::{DelegatedRemoteTargetCreation, RemoteTargetCreationReconciler, SweepReport};
