//! coopvm: cooperative host runtime for a cell-based bytecode VM
//!
//! A program runs on a single context. When it executes `sleep`, the host
//! keeps servicing events through the idle function of its extensions and
//! resumes the program where it stopped once the requested delay has passed.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use coopvm::{run_file, RunOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let report = run_file(Path::new("blink.cvm"), &RunOptions::default())?;
//!     println!("returned {}", report.value);
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod ext;
pub mod runtime;
pub mod util;
pub mod vm;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::{RunOptions, RunReport, Session};

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::vm::program::Program;

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime name
pub const NAME: &str = "coopvm";

/// `path` with `.{extension}` appended to the file name
pub fn with_suffix(
    path: &Path,
    extension: &str,
) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension.trim_start_matches('.'));
    PathBuf::from(name)
}

/// Load a program image, retrying once with `.{default_extension}` appended.
///
/// Returns the path that was actually loaded with the program.
pub fn load_program(
    path: &Path,
    default_extension: &str,
) -> Result<(PathBuf, Program)> {
    match Program::load(path) {
        Ok(program) => Ok((path.to_path_buf(), program)),
        Err(first) => {
            let retry = with_suffix(path, default_extension);
            debug!("Failed to load {} ({}), trying {}", path.display(), first, retry.display());
            let program = Program::load(&retry)
                .with_context(|| format!("Failed to load program: {}", path.display()))?;
            Ok((retry, program))
        }
    }
}

/// Load and run a program image
pub fn run_file(
    path: &Path,
    options: &RunOptions,
) -> Result<RunReport> {
    let (image, program) = load_program(path, vm::program::DEFAULT_EXTENSION)?;
    let mut session = Session::new(Rc::new(program), options)?.with_image(&image);
    session.run().map_err(|fault| {
        let report = session.reporter().render(&fault, session.program());
        anyhow::anyhow!(report.trim_end().to_string())
    })
}
