//! Idle functions
//!
//! An extension that services events (timers, input, ...) registers an
//! [`IdleFunction`] under [`Tag::IDLE`]. The driver calls it while the
//! program sleeps, and keeps calling it after an event-driven program (one
//! without `main`) has been started.

use std::fmt;
use std::rc::Rc;

use crate::runtime::userdata::Tag;
use crate::vm::context::Context;
use crate::vm::errors::{VMResult, VmError};
use crate::vm::executor::Engine;

/// Result of one idle invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStatus {
    /// Call again if the budget allows
    Continue,
    /// Nothing left to service
    Done,
    Error(VmError),
}

/// Host callback serviced while the program is suspended.
///
/// `engine` lets the handler execute public functions on `ctx`.
pub trait IdleHandler {
    fn idle(
        &self,
        ctx: &mut Context,
        engine: &dyn Engine,
    ) -> IdleStatus;
}

impl<F> IdleHandler for F
where
    F: Fn(&mut Context, &dyn Engine) -> IdleStatus,
{
    fn idle(
        &self,
        ctx: &mut Context,
        engine: &dyn Engine,
    ) -> IdleStatus {
        self(ctx, engine)
    }
}

/// Registry entry wrapping an idle handler
pub struct IdleFunction {
    handler: Box<dyn IdleHandler>,
}

impl IdleFunction {
    pub fn new(handler: impl IdleHandler + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    #[inline]
    pub fn invoke(
        &self,
        ctx: &mut Context,
        engine: &dyn Engine,
    ) -> IdleStatus {
        self.handler.idle(ctx, engine)
    }

    /// Register on `ctx`, replacing any idle function already there.
    pub fn install(
        self,
        ctx: &mut Context,
    ) -> VMResult<()> {
        ctx.user_data_mut().set(Tag::IDLE, Rc::new(self))
    }
}

impl fmt::Debug for IdleFunction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("IdleFunction")
    }
}
