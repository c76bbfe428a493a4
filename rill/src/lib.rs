//! rill interpreter library
//!
//! A minimal line-oriented scripting language: one instruction per line,
//! flat position-based operands, labeled jumps, and subroutine calls over an
//! explicit call stack.

pub mod decode;
pub mod engine;
pub mod error;
pub mod ops;
pub mod program;
pub mod repl;
pub mod store;
pub mod util;

pub use engine::Machine;
pub use error::{Fault, Result, RunError};
