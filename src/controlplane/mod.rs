//! External Action Adapters
//!
//! HTTP implementations of the domain ports: the storage service control
//! plane and blade compute actions.

mod compute;
mod storage_service;

pub use compute::HttpComputeActions;
pub use storage_service::{HttpStorageControlPlane, ResourceState};
