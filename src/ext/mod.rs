//! Host extensions
//!
//! Statically linked providers of native functions and idle functions.
//! Each extension binds its exports into a context at initialization; after
//! all extensions ran, every native the program imports must be bound.

pub mod core;
pub mod time;

use tracing::debug;

use crate::vm::context::{Context, NativeFn};
use crate::vm::errors::VMResult;

pub use self::core::CoreExtension;
pub use self::time::TimeExtension;

use std::fmt;

/// A native function exported by an extension.
#[derive(Debug, Clone, Copy)]
pub struct NativeExport {
    /// Import name the program uses
    pub name: &'static str,
    /// Human-readable signature (e.g., "(ms) -> 0")
    pub signature: &'static str,
    pub func: NativeFn,
}

impl NativeExport {
    pub const fn new(
        name: &'static str,
        signature: &'static str,
        func: NativeFn,
    ) -> Self {
        Self {
            name,
            signature,
            func,
        }
    }
}

impl fmt::Display for NativeExport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}

/// Host extension
pub trait Extension {
    fn name(&self) -> &str;

    fn exports(&self) -> Vec<NativeExport>;

    /// Bind exports into `ctx` and set up any per-context state.
    fn init(
        &self,
        ctx: &mut Context,
    ) -> VMResult<()> {
        register(ctx, &self.exports());
        Ok(())
    }
}

/// Bind `exports` into `ctx`
pub fn register(
    ctx: &mut Context,
    exports: &[NativeExport],
) -> usize {
    let table: Vec<(&str, NativeFn)> = exports.iter().map(|e| (e.name, e.func)).collect();
    let bound = ctx.register_natives(&table);
    for export in exports {
        if ctx.program().natives.iter().any(|n| n == export.name) {
            debug!("bound native {}", export);
        }
    }
    bound
}

/// The extensions every context gets.
pub fn builtin(args: Vec<String>) -> Vec<Box<dyn Extension>> {
    vec![
        Box::new(CoreExtension::new(args)),
        Box::new(TimeExtension::new()),
    ]
}

/// Initialize `extensions` on `ctx`, then check that no import is left
/// unresolved.
pub fn init_all(
    ctx: &mut Context,
    extensions: &[Box<dyn Extension>],
) -> VMResult<()> {
    for ext in extensions {
        ext.init(ctx)?;
        debug!(extension = ext.name(), "extension initialized");
    }
    ctx.verify_natives()
}

#[cfg(test)]
mod tests;
