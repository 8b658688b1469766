//! Virtual Machine and bytecode execution
//!
//! This module contains the engine seam, the reference interpreter, and the
//! program image format it loads.

pub use context::{Checkpoint, Context, ContextSnapshot, MonitorHook, NativeFn};
pub use debug::{DebugInfo, SourceLocation};
pub use errors::{VMResult, VmError};
pub use executor::{Engine, Entry, Interpreter, Outcome, VMConfig};
pub use program::{Cell, LoadError, Program};

pub mod builder;
pub mod context;
pub mod debug;
pub mod errors;
pub mod executor;
pub mod opcode;
pub mod program;

#[cfg(test)]
mod tests;
