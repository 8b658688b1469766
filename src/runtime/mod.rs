//! Host runtime
//!
//! This module contains the execution driver and the side channels the
//! engine calls into at checkpoints.

pub mod diagnostics;
pub mod interrupt;
pub mod reporter;
pub mod scheduler;
pub mod session;
pub mod userdata;

pub use diagnostics::DiagnosticsRecord;
pub use interrupt::{request_abort, AbortState};
pub use reporter::FaultReporter;
pub use scheduler::{
    Driver, DriverConfig, Fault, IdleFunction, IdleStatus, RunStats, SnapshotPolicy,
};
pub use session::{RunOptions, RunReport, Session};
pub use userdata::{Tag, UserDataRegistry};

#[cfg(test)]
mod tests;
