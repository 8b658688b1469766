//! Cooperative execution driver
//!
//! Runs a program to completion, transparently resuming it after each sleep.
//! While the program sleeps, the idle function registered by an extension is
//! called against a snapshot of the parked context until the program's delay
//! hint has elapsed. Programs without `main` (event-driven programs) are
//! served by the idle function on the live context until it reports done.
//!
//! ```text
//!   run ──► Sleeping(d) ──► idle(snapshot) ×N for d ms ──► resume ──┐
//!    │                                                               │
//!    ├──► NoEntryPoint ──► idle(live) until Done                     │
//!    ├──► Fatal(e) ──► Err                                           │
//!    └──► Success(v) ──► Ok(v)  ◄────────────────────────────────────┘
//! ```
//!
//! The delay budget is checked against a monotonic clock before every idle
//! invocation; one invocation is the granularity.

pub mod idle;

pub use idle::{IdleFunction, IdleHandler, IdleStatus};

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::runtime::userdata::Tag;
use crate::vm::context::Context;
use crate::vm::errors::VmError;
use crate::vm::executor::{Engine, Outcome};
use crate::vm::program::Cell;

/// When the idle function gets a fresh snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotPolicy {
    /// One snapshot per sleep, reused by every idle call of that sleep
    #[default]
    PerSleep,
    /// A fresh snapshot before every idle call
    PerIteration,
}

impl std::str::FromStr for SnapshotPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-sleep" => Ok(SnapshotPolicy::PerSleep),
            "per-iteration" => Ok(SnapshotPolicy::PerIteration),
            other => Err(format!("unknown snapshot policy '{}'", other)),
        }
    }
}

/// Driver configuration.
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    pub snapshot_policy: SnapshotPolicy,
}

/// Terminal failure of a run: the error and the program counter it was
/// raised at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Run time error {}: \"{}\" on address {}", .error.code(), .error, .cip)]
pub struct Fault {
    pub error: VmError,
    pub cip: usize,
}

impl Fault {
    pub fn new(
        error: VmError,
        cip: usize,
    ) -> Self {
        Self { error, cip }
    }
}

/// Counters of one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub sleeps: usize,
    pub resumes: usize,
    pub idle_calls: usize,
    pub elapsed: Duration,
}

/// Execution driver
#[derive(Debug)]
pub struct Driver<E: Engine> {
    engine: E,
    config: DriverConfig,
    stats: RunStats,
}

impl<E: Engine> Driver<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, DriverConfig::default())
    }

    pub fn with_config(
        engine: E,
        config: DriverConfig,
    ) -> Self {
        Self {
            engine,
            config,
            stats: RunStats::default(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Statistics of the last `execute`
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Run `ctx` until it completes or fails.
    pub fn execute(
        &mut self,
        ctx: &mut Context,
    ) -> Result<Cell, Fault> {
        self.stats = RunStats::default();
        let started = Instant::now();
        let idle = ctx.user_data().get::<IdleFunction>(Tag::IDLE);

        let mut outcome = self.engine.run(ctx);
        let result = loop {
            match outcome {
                Outcome::Success(value) => break Ok(value),
                Outcome::Sleeping(delay) => {
                    self.stats.sleeps += 1;
                    let Some(idle) = idle.as_deref() else {
                        warn!("program went to sleep but no idle function is registered");
                        break Err(Fault::new(VmError::Sleep, ctx.cip()));
                    };
                    if let Err(fault) = self.idle_while_sleeping(ctx, idle, delay) {
                        break Err(fault);
                    }
                    self.stats.resumes += 1;
                    outcome = self.engine.resume(ctx);
                }
                Outcome::NoEntryPoint => match idle.as_deref() {
                    Some(idle) => {
                        debug!("no main entry point, serving events");
                        break self.idle_until_done(ctx, idle);
                    }
                    None => break Err(Fault::new(VmError::Index, ctx.cip())),
                },
                Outcome::Fatal(error) => break Err(Fault::new(error, ctx.cip())),
            }
        };

        self.stats.elapsed = started.elapsed();
        match &result {
            Ok(value) => info!(
                value,
                sleeps = self.stats.sleeps,
                idle_calls = self.stats.idle_calls,
                "program finished"
            ),
            Err(fault) if fault.error.is_abort() => warn!("program aborted at {}", fault.cip),
            Err(fault) => debug!("program failed: {}", fault),
        }
        result
    }

    /// Idle against a snapshot of the parked context for `delay` ms.
    ///
    /// Takes `ctx` by shared reference: the parked context cannot be touched
    /// until the driver resumes it.
    fn idle_while_sleeping(
        &mut self,
        ctx: &Context,
        idle: &IdleFunction,
        delay: Cell,
    ) -> Result<(), Fault> {
        let budget = Duration::from_millis(delay.max(0) as u64);
        let stamp = Instant::now();
        let mut snapshot = ctx.snapshot();
        let mut first = true;

        while stamp.elapsed() < budget {
            if !first && self.config.snapshot_policy == SnapshotPolicy::PerIteration {
                snapshot = ctx.snapshot();
            }
            first = false;

            self.stats.idle_calls += 1;
            match idle.invoke(&mut snapshot, &self.engine) {
                IdleStatus::Continue => {}
                IdleStatus::Done => break,
                IdleStatus::Error(error) => return Err(Fault::new(error, snapshot.cip())),
            }
        }
        debug!(
            budget_ms = delay,
            spent_ms = stamp.elapsed().as_millis() as u64,
            "idle cycle over"
        );
        Ok(())
    }

    /// Serve an event-driven program on the live context.
    fn idle_until_done(
        &mut self,
        ctx: &mut Context,
        idle: &IdleFunction,
    ) -> Result<Cell, Fault> {
        loop {
            self.stats.idle_calls += 1;
            match idle.invoke(ctx, &self.engine) {
                IdleStatus::Continue => {}
                IdleStatus::Done => return Ok(0),
                IdleStatus::Error(error) => return Err(Fault::new(error, ctx.cip())),
            }
        }
    }
}

#[cfg(test)]
mod tests;
