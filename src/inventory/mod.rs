//! Inventory
//!
//! Repository of blades, storage assets and composed nodes with atomic
//! units of work and post-commit event publication.

mod events;
mod snapshot;
mod store;

pub use events::InventoryEvent;
pub use snapshot::InventorySnapshot;
pub use store::{Inventory, InventoryTables, UnitOfWork, DEFAULT_EVENT_CAPACITY};
