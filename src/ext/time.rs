//! Timer extension
//!
//! `settimer(ms, repeat)` arms a timer and `gettimer()` reads its interval;
//! the idle function calls the program's public `@timer` whenever it is due. An event-driven program ends when it
//! disarms the timer (`killtimer` or a one-shot timer firing).

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::ext::{register, Extension, NativeExport};
use crate::runtime::scheduler::{IdleFunction, IdleStatus};
use crate::runtime::userdata::Tag;
use crate::vm::context::Context;
use crate::vm::errors::{VMResult, VmError};
use crate::vm::executor::{Engine, Entry, Outcome};
use crate::vm::program::Cell;

/// Public function called when the timer fires
pub const TIMER_PUBLIC: &str = "@timer";

/// Longest the idle function blocks per call while waiting
const IDLE_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct Timer {
    interval: Duration,
    repeat: bool,
    due: Option<Instant>,
}

/// Per-context timer state
#[derive(Debug, Default)]
pub struct TimerState {
    timer: RefCell<Timer>,
}

impl TimerState {
    pub fn arm(
        &self,
        interval: Duration,
        repeat: bool,
    ) {
        let mut timer = self.timer.borrow_mut();
        timer.interval = interval;
        timer.repeat = repeat;
        timer.due = Some(Instant::now() + interval);
    }

    pub fn disarm(&self) {
        self.timer.borrow_mut().due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.timer.borrow().due.is_some()
    }

    /// If the timer is due at `now`, advance or disarm it and return true.
    fn fire(
        &self,
        now: Instant,
    ) -> bool {
        let mut timer = self.timer.borrow_mut();
        match timer.due {
            Some(due) if due <= now => {
                timer.due = timer.repeat.then(|| now + timer.interval);
                true
            }
            _ => false,
        }
    }

    /// Interval of the armed timer
    pub fn interval(&self) -> Option<Duration> {
        let timer = self.timer.borrow();
        timer.due.map(|_| timer.interval)
    }

    fn due(&self) -> Option<Instant> {
        self.timer.borrow().due
    }
}

/// Time extension
#[derive(Debug, Default)]
pub struct TimeExtension;

impl TimeExtension {
    pub fn new() -> Self {
        Self
    }
}

impl Extension for TimeExtension {
    fn name(&self) -> &str {
        "time"
    }

    fn exports(&self) -> Vec<NativeExport> {
        vec![
            NativeExport::new("settimer", "(ms, repeat) -> 0", native_settimer),
            NativeExport::new("gettimer", "() -> ms", native_gettimer),
            NativeExport::new("killtimer", "() -> 0", native_killtimer),
        ]
    }

    fn init(
        &self,
        ctx: &mut Context,
    ) -> VMResult<()> {
        register(ctx, &self.exports());
        ctx.user_data_mut()
            .set(Tag::TIMER, Rc::new(TimerState::default()))?;
        IdleFunction::new(timer_idle).install(ctx)
    }
}

fn timer_state(ctx: &Context) -> VMResult<Rc<TimerState>> {
    ctx.user_data()
        .get::<TimerState>(Tag::TIMER)
        .ok_or(VmError::Native)
}

fn native_settimer(ctx: &mut Context) -> VMResult<Cell> {
    let ms = u64::try_from(ctx.pri).map_err(|_| VmError::Params)?;
    let timer = timer_state(ctx)?;
    if ms == 0 {
        timer.disarm();
    } else {
        timer.arm(Duration::from_millis(ms), ctx.alt != 0);
    }
    Ok(0)
}

/// Interval of the armed timer in milliseconds, 0 if none
fn native_gettimer(ctx: &mut Context) -> VMResult<Cell> {
    let ms = timer_state(ctx)?
        .interval()
        .map_or(0, |interval| interval.as_millis());
    Ok(ms as Cell)
}

fn native_killtimer(ctx: &mut Context) -> VMResult<Cell> {
    timer_state(ctx)?.disarm();
    Ok(0)
}

/// Idle function of the time extension.
///
/// A sleeping context (snapshot) always gets `Continue` so the sleep lasts
/// its full budget; a live event-driven context gets `Done` once no timer
/// is armed.
pub fn timer_idle(
    ctx: &mut Context,
    engine: &dyn Engine,
) -> IdleStatus {
    let Some(timer) = ctx.user_data().get::<TimerState>(Tag::TIMER) else {
        return IdleStatus::Done;
    };

    let now = Instant::now();
    let Some(due) = timer.due() else {
        if ctx.is_sleeping() {
            thread::sleep(IDLE_POLL);
            return IdleStatus::Continue;
        }
        return IdleStatus::Done;
    };
    if due > now {
        thread::sleep((due - now).min(IDLE_POLL));
        return IdleStatus::Continue;
    }
    if !timer.fire(now) {
        return IdleStatus::Continue;
    }

    let Some(index) = ctx.program().find_public(TIMER_PUBLIC) else {
        return IdleStatus::Error(VmError::NotFound);
    };
    debug!("timer fired");
    match engine.exec(ctx, Entry::Public(index)) {
        Outcome::Success(_) => IdleStatus::Continue,
        Outcome::Fatal(err) => IdleStatus::Error(err),
        Outcome::Sleeping(_) => IdleStatus::Error(VmError::Sleep),
        Outcome::NoEntryPoint => IdleStatus::Error(VmError::Index),
    }
}
