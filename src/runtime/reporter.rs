//! Run time error reporting
//!
//! Renders a [`Fault`] as
//!
//! ```text
//! Run time error 11: "divide by zero" on address 420
//! File: blink.p, line: 12
//! ```
//!
//! The location line appears only when debug information can be loaded and
//! resolves the address. Loading happens lazily, only when a fault is
//! reported, and any failure there just drops the location line.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::runtime::scheduler::Fault;
use crate::vm::debug::{DebugInfo, SourceLocation};
use crate::vm::program::Program;

/// Exit status for every fatal path
pub const EXIT_FAILURE: i32 = 1;

/// 报告器
#[derive(Debug, Clone, Default)]
pub struct FaultReporter {
    /// Image to read the debug section from
    image: Option<PathBuf>,
}

impl FaultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve locations from the image at `path`
    pub fn with_image(
        mut self,
        path: &Path,
    ) -> Self {
        self.image = Some(path.to_path_buf());
        self
    }

    /// Map `cip` to a source location, if debug information allows.
    pub fn resolve(
        &self,
        program: &Program,
        cip: usize,
    ) -> Option<SourceLocation> {
        if let Some(dbg) = &program.debug {
            return dbg.lookup(cip);
        }
        if !program.has_debug_info() {
            return None;
        }
        let path = self.image.as_deref()?;
        match DebugInfo::load_from_path(path) {
            Ok(dbg) => dbg.lookup(cip),
            Err(err) => {
                debug!("debug information unavailable: {}", err);
                None
            }
        }
    }

    /// Render the report text
    pub fn render(
        &self,
        fault: &Fault,
        program: &Program,
    ) -> String {
        let mut out = format!("{}\n", fault);
        if let Some(location) = self.resolve(program, fault.cip) {
            out.push_str(&format!("{}\n", location));
        }
        out
    }

    /// Print the report to `writer`
    pub fn report_to<W: Write>(
        &self,
        writer: &mut W,
        fault: &Fault,
        program: &Program,
    ) -> io::Result<()> {
        if fault.error.is_abort() {
            warn!("execution interrupted on request");
        }
        writer.write_all(self.render(fault, program).as_bytes())?;
        writer.flush()
    }

    /// Print the report to stdout
    pub fn report(
        &self,
        fault: &Fault,
        program: &Program,
    ) {
        let stdout = io::stdout();
        if let Err(err) = self.report_to(&mut stdout.lock(), fault, program) {
            debug!("failed to write fault report: {}", err);
        }
    }

    /// Report and terminate the process.
    pub fn exit_on_error(
        &self,
        fault: &Fault,
        program: &Program,
    ) -> ! {
        self.report(fault, program);
        std::process::exit(EXIT_FAILURE)
    }
}
