//! Composed Node Lifecycle
//!
//! Power and boot transitions of composed nodes after allocation:
//! assembly, disassembly and reset.

mod assembler;
mod disassembler;
mod reset;

pub use assembler::NodeAssembler;
pub use disassembler::NodeDisassembler;
pub use reset::{NodeReset, SUPPORTED_RESET_TYPES};
