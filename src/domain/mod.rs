//! Domain layer - Entities, allocation templates and port definitions
//!
//! This module defines the pooled hardware model and the traits (ports)
//! that the external action adapters implement.

pub mod model;
pub mod ports;
pub mod template;

pub use model::*;
pub use ports::*;
pub use template::*;
