//! Host session
//!
//! One loaded program with its context, its extensions and a driver. This is
//! what the `coopvm` binary runs; embedders can use it the same way.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::ext;
use crate::runtime::diagnostics::{self, DiagnosticsRecord};
use crate::runtime::reporter::FaultReporter;
use crate::runtime::scheduler::{Driver, DriverConfig, Fault, RunStats, SnapshotPolicy};
use crate::util::config::HostConfig;
use crate::vm::context::Context;
use crate::vm::executor::{Interpreter, VMConfig};
use crate::vm::program::{Cell, Program};

/// Options of one session
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Data memory per context (bytes)
    pub memory_size: usize,
    pub snapshot_policy: SnapshotPolicy,
    /// Collect stack/heap high-water marks
    pub monitor_stack: bool,
    /// Arguments exposed through `numargs`/`getarg`
    pub args: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&HostConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            memory_size: config.runtime.memory_size,
            snapshot_policy: config.runtime.snapshot_policy,
            monitor_stack: false,
            args: Vec::new(),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub value: Cell,
    pub stats: RunStats,
    pub max_stack_bytes: usize,
    pub max_heap_bytes: usize,
}

impl RunReport {
    /// Whether stack/heap usage was recorded
    pub fn has_usage(&self) -> bool {
        self.max_stack_bytes != 0 || self.max_heap_bytes != 0
    }

    /// The summary printed after a successful run.
    pub fn summary(&self) -> String {
        let cell = std::mem::size_of::<Cell>();
        let mut out = String::new();
        if self.value != 0 {
            let _ = writeln!(out, "\nReturn value: {}", self.value);
        }
        let _ = writeln!(
            out,
            "\nRun time:     {:.2} seconds",
            self.stats.elapsed.as_secs_f64()
        );
        if self.has_usage() {
            let _ = writeln!(
                out,
                "Stack usage:  {} cells ({} bytes)",
                self.max_stack_bytes / cell,
                self.max_stack_bytes
            );
            let _ = writeln!(
                out,
                "Heap usage:   {} cells ({} bytes)",
                self.max_heap_bytes / cell,
                self.max_heap_bytes
            );
        }
        out
    }
}

/// A program ready to run
#[derive(Debug)]
pub struct Session {
    image: Option<PathBuf>,
    context: Context,
    driver: Driver<Interpreter>,
    diagnostics: Option<Rc<DiagnosticsRecord>>,
}

impl Session {
    /// Create the context and initialize the built-in extensions.
    ///
    /// Initialization failures (e.g. an unresolved native) are reported as
    /// a fault at address 0.
    pub fn new(
        program: Rc<Program>,
        options: &RunOptions,
    ) -> Result<Self, Fault> {
        let interpreter = Interpreter::new_with_config(VMConfig {
            memory_size: options.memory_size,
            ..VMConfig::default()
        });
        let mut context = interpreter
            .context(program)
            .map_err(|err| Fault::new(err, 0))?;
        ext::init_all(&mut context, &ext::builtin(options.args.clone()))
            .map_err(|err| Fault::new(err, 0))?;

        let diagnostics = if options.monitor_stack {
            if !context.program().has_checks() {
                warn!(
                    "This program was built without checkpoints. \
                     Stack monitoring is non-functional"
                );
            }
            Some(diagnostics::enable(&mut context).map_err(|err| Fault::new(err, 0))?)
        } else {
            None
        };

        let driver = Driver::with_config(
            interpreter,
            DriverConfig {
                snapshot_policy: options.snapshot_policy,
            },
        );
        debug!(
            memory = options.memory_size,
            monitor = options.monitor_stack,
            "session ready"
        );
        Ok(Self {
            image: None,
            context,
            driver,
            diagnostics,
        })
    }

    /// Image the program was loaded from, used to resolve fault locations
    pub fn with_image(
        mut self,
        path: &Path,
    ) -> Self {
        self.image = Some(path.to_path_buf());
        self
    }

    pub fn program(&self) -> &Program {
        self.context.program()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn diagnostics(&self) -> Option<&DiagnosticsRecord> {
        self.diagnostics.as_deref()
    }

    /// Run the program to completion.
    pub fn run(&mut self) -> Result<RunReport, Fault> {
        let value = self.driver.execute(&mut self.context)?;
        let (max_stack_bytes, max_heap_bytes) = self
            .diagnostics
            .as_deref()
            .map_or((0, 0), |d| (d.max_stack_bytes(), d.max_heap_bytes()));
        Ok(RunReport {
            value,
            stats: self.driver.stats().clone(),
            max_stack_bytes,
            max_heap_bytes,
        })
    }

    /// Reporter resolving locations against this session's image
    pub fn reporter(&self) -> FaultReporter {
        match &self.image {
            Some(path) => FaultReporter::new().with_image(path),
            None => FaultReporter::new(),
        }
    }
}
