//! Core natives: console output, timing, program arguments.

use std::io::{self, Write};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use crate::ext::{register, Extension, NativeExport};
use crate::runtime::userdata::Tag;
use crate::vm::context::Context;
use crate::vm::errors::{VMResult, VmError};
use crate::vm::program::Cell;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Arguments passed through from the host command line.
#[derive(Debug, Clone, Default)]
pub struct ProgramArgs(pub Vec<String>);

/// Core extension
#[derive(Debug, Default)]
pub struct CoreExtension {
    args: Vec<String>,
}

impl CoreExtension {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

impl Extension for CoreExtension {
    fn name(&self) -> &str {
        "core"
    }

    fn exports(&self) -> Vec<NativeExport> {
        vec![
            NativeExport::new("print", "(value) -> 0", native_print),
            NativeExport::new("printc", "(char) -> 0", native_printc),
            NativeExport::new("tickcount", "() -> ms", native_tickcount),
            NativeExport::new("delay", "(ms) -> 0", native_delay),
            NativeExport::new("numargs", "() -> count", native_numargs),
            NativeExport::new("getarg", "(index) -> value", native_getarg),
        ]
    }

    fn init(
        &self,
        ctx: &mut Context,
    ) -> VMResult<()> {
        Lazy::force(&EPOCH);
        register(ctx, &self.exports());
        if !self.args.is_empty() {
            ctx.user_data_mut()
                .set(Tag::ARGS, Rc::new(ProgramArgs(self.args.clone())))?;
        }
        Ok(())
    }
}

fn native_print(ctx: &mut Context) -> VMResult<Cell> {
    let mut out = io::stdout().lock();
    write!(out, "{}", ctx.pri).map_err(|_| VmError::Native)?;
    out.flush().map_err(|_| VmError::Native)?;
    Ok(0)
}

fn native_printc(ctx: &mut Context) -> VMResult<Cell> {
    let c = u32::try_from(ctx.pri)
        .ok()
        .and_then(char::from_u32)
        .ok_or(VmError::Params)?;
    let mut out = io::stdout().lock();
    write!(out, "{}", c).map_err(|_| VmError::Native)?;
    out.flush().map_err(|_| VmError::Native)?;
    Ok(0)
}

fn native_tickcount(_ctx: &mut Context) -> VMResult<Cell> {
    Ok(EPOCH.elapsed().as_millis() as Cell)
}

/// Blocks the whole host; programs that want to stay responsive use `sleep`.
fn native_delay(ctx: &mut Context) -> VMResult<Cell> {
    let ms = u64::try_from(ctx.pri).map_err(|_| VmError::Params)?;
    thread::sleep(Duration::from_millis(ms));
    Ok(0)
}

fn native_numargs(ctx: &mut Context) -> VMResult<Cell> {
    let count = ctx
        .user_data()
        .get::<ProgramArgs>(Tag::ARGS)
        .map_or(0, |args| args.0.len());
    Ok(count as Cell)
}

/// Numeric value of argument PRI
fn native_getarg(ctx: &mut Context) -> VMResult<Cell> {
    let args = ctx
        .user_data()
        .get::<ProgramArgs>(Tag::ARGS)
        .ok_or(VmError::Params)?;
    let index = usize::try_from(ctx.pri).map_err(|_| VmError::Params)?;
    args.0
        .get(index)
        .and_then(|a| a.parse::<Cell>().ok())
        .ok_or(VmError::Params)
}
