//! Purr Intermediate Representation
//!
//! A simple register-based IR built from typed basic blocks. It is designed
//! to be:
//! - Easy to generate from the annotated AST
//! - Easy to hand to an external optimizing backend as a textual module
//! - Cheap to verify structurally before emission

mod builder;
mod instr;
mod printer;
mod types;
mod verify;

// Re-export in logical order
pub use builder::*;
pub use instr::*;
pub use printer::*;
pub use types::*;
pub use verify::*;
