//! Virtual Machine executor
//!
//! [`Engine`] is the seam the host drives programs through; [`Interpreter`]
//! is the reference implementation for the cell instruction set in
//! [`crate::vm::opcode`].

use std::rc::Rc;

use tracing::{debug, trace};

use crate::vm::context::{Checkpoint, Context};
use crate::vm::errors::{VMResult, VmError};
use crate::vm::opcode::Opcode;
use crate::vm::program::{Cell, Program, CELL_SIZE};

/// Where an execution starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// The program's `main`
    Main,
    /// Continue a sleeping context where it stopped
    Continue,
    /// Public function by index
    Public(usize),
}

/// Result of one run/resume call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success(Cell),
    /// Suspended; the value is the program's delay hint in milliseconds.
    Sleeping(Cell),
    /// The program has no `main` (event-driven program)
    NoEntryPoint,
    Fatal(VmError),
}

impl Outcome {
    /// Only a sleeping outcome may be resumed.
    #[inline]
    pub fn is_resumable(&self) -> bool {
        matches!(self, Outcome::Sleeping(_))
    }
}

/// Execution engine
pub trait Engine {
    /// Execute `ctx` from `entry`
    fn exec(
        &self,
        ctx: &mut Context,
        entry: Entry,
    ) -> Outcome;

    /// Run the program's main entry point
    fn run(
        &self,
        ctx: &mut Context,
    ) -> Outcome {
        self.exec(ctx, Entry::Main)
    }

    /// Continue a context parked by [`Outcome::Sleeping`]
    fn resume(
        &self,
        ctx: &mut Context,
    ) -> Outcome {
        self.exec(ctx, Entry::Continue)
    }
}

/// VM 配置
#[derive(Debug, Clone)]
pub struct VMConfig {
    /// Data memory per context (bytes)
    pub memory_size: usize,
    /// 是否启用跟踪
    pub trace_execution: bool,
}

impl Default for VMConfig {
    fn default() -> Self {
        Self {
            memory_size: 16 * 1024,
            trace_execution: false,
        }
    }
}

enum Halt {
    Return(Cell),
    Sleep(Cell),
}

/// 参考解释器
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: VMConfig,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_config(config: VMConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VMConfig {
        &self.config
    }

    /// Create a context for `program` sized per this interpreter's config.
    pub fn context(
        &self,
        program: Rc<Program>,
    ) -> VMResult<Context> {
        Context::new(program, self.config.memory_size)
    }

    fn enter(
        &self,
        ctx: &mut Context,
        address: usize,
    ) -> VMResult<()> {
        ctx.reset_stk = ctx.stk;
        ctx.reset_hea = ctx.hea;
        // return address 0 holds `halt 0`
        ctx.push(0)?;
        ctx.cip = address;
        Ok(())
    }

    fn fetch(
        program: &Program,
        addr: usize,
    ) -> VMResult<Cell> {
        if addr % CELL_SIZE != 0 {
            return Err(VmError::MemoryAccess);
        }
        program
            .code
            .get(addr / CELL_SIZE)
            .copied()
            .ok_or(VmError::MemoryAccess)
    }

    fn code_target(
        program: &Program,
        target: Cell,
    ) -> VMResult<usize> {
        let target = usize::try_from(target).map_err(|_| VmError::MemoryAccess)?;
        if target % CELL_SIZE != 0 || target >= program.code_size() {
            return Err(VmError::MemoryAccess);
        }
        Ok(target)
    }

    fn data_address(
        base: usize,
        offset: Cell,
    ) -> VMResult<usize> {
        base.checked_add_signed(offset as isize)
            .ok_or(VmError::MemoryAccess)
    }

    fn execute(
        &self,
        ctx: &mut Context,
    ) -> VMResult<Halt> {
        let program = Rc::clone(ctx.program());

        loop {
            let start = ctx.cip;
            match self.step(ctx, &program, start) {
                Ok(None) => {}
                Ok(Some(halt)) => return Ok(halt),
                Err(err) => {
                    // faults report the address of the failing instruction
                    ctx.cip = start;
                    return Err(err);
                }
            }
        }
    }

    fn step(
        &self,
        ctx: &mut Context,
        program: &Program,
        start: usize,
    ) -> VMResult<Option<Halt>> {
        let op = Opcode::try_from(Self::fetch(program, start)?)
            .map_err(|_| VmError::InvalidInstruction)?;
        let operand = if op.operand_count() > 0 {
            Self::fetch(program, start + CELL_SIZE).map_err(|_| VmError::InvalidInstruction)?
        } else {
            0
        };
        let next = start + (1 + op.operand_count()) * CELL_SIZE;

        if self.config.trace_execution {
            trace!(cip = start, op = %op, operand, pri = ctx.pri, alt = ctx.alt, stk = ctx.stk);
        }

        ctx.cip = next;
        match op {
            Opcode::Nop => {}
            Opcode::Halt => {
                ctx.cip = start;
                // operand is an error code; codes with no error of their own
                // are reported as `General`
                return match VmError::from_code(operand) {
                    None => Ok(Some(Halt::Return(ctx.pri))),
                    Some(err) => Err(err),
                };
            }
            Opcode::ConstPri => ctx.pri = operand,
            Opcode::ConstAlt => ctx.alt = operand,
            Opcode::LoadPri => ctx.pri = ctx.read(Self::data_address(0, operand)?)?,
            Opcode::LoadAlt => ctx.alt = ctx.read(Self::data_address(0, operand)?)?,
            Opcode::StorPri => ctx.write(Self::data_address(0, operand)?, ctx.pri)?,
            Opcode::LoadSPri => ctx.pri = ctx.read(Self::data_address(ctx.frm, operand)?)?,
            Opcode::StorSPri => ctx.write(Self::data_address(ctx.frm, operand)?, ctx.pri)?,
            Opcode::PushPri => ctx.push(ctx.pri)?,
            Opcode::PushAlt => ctx.push(ctx.alt)?,
            Opcode::PushC => ctx.push(operand)?,
            Opcode::PopPri => ctx.pri = ctx.pop()?,
            Opcode::PopAlt => ctx.alt = ctx.pop()?,
            Opcode::Stack => {
                let stk = Self::data_address(ctx.stk, operand)?;
                if stk > ctx.stp {
                    return Err(VmError::StackLow);
                }
                if stk < ctx.hea {
                    return Err(VmError::StackError);
                }
                ctx.stk = stk;
                ctx.alt = stk as Cell;
            }
            Opcode::Heap => {
                let hea = Self::data_address(ctx.hea, operand)?;
                if hea < ctx.hlw {
                    return Err(VmError::HeapLow);
                }
                if hea > ctx.stk {
                    return Err(VmError::StackError);
                }
                ctx.alt = ctx.hea as Cell;
                ctx.hea = hea;
            }
            Opcode::Add => ctx.pri = ctx.pri.wrapping_add(ctx.alt),
            Opcode::Sub => ctx.pri = ctx.pri.wrapping_sub(ctx.alt),
            Opcode::Smul => ctx.pri = ctx.pri.wrapping_mul(ctx.alt),
            Opcode::Sdiv => {
                if ctx.alt == 0 {
                    return Err(VmError::Divide);
                }
                let (q, r) = (ctx.pri.wrapping_div(ctx.alt), ctx.pri.wrapping_rem(ctx.alt));
                ctx.pri = q;
                ctx.alt = r;
            }
            Opcode::Eq => ctx.pri = (ctx.pri == ctx.alt) as Cell,
            Opcode::Less => ctx.pri = (ctx.pri < ctx.alt) as Cell,
            Opcode::IncPri => ctx.pri = ctx.pri.wrapping_add(1),
            Opcode::Bounds => {
                if ctx.pri < 0 || ctx.pri > operand {
                    return Err(VmError::Bounds);
                }
            }
            Opcode::Jump => ctx.cip = Self::code_target(program, operand)?,
            Opcode::Jzer => {
                if ctx.pri == 0 {
                    ctx.cip = Self::code_target(program, operand)?;
                }
            }
            Opcode::Jnz => {
                if ctx.pri != 0 {
                    ctx.cip = Self::code_target(program, operand)?;
                }
            }
            Opcode::Call => {
                let target = Self::code_target(program, operand)?;
                ctx.push(next as Cell)?;
                ctx.cip = target;
            }
            Opcode::Proc => {
                ctx.push(ctx.frm as Cell)?;
                ctx.frm = ctx.stk;
            }
            Opcode::Ret => {
                let frm = ctx.pop()?;
                let ret = ctx.pop()?;
                ctx.frm = usize::try_from(frm).map_err(|_| VmError::MemoryAccess)?;
                ctx.cip = Self::code_target(program, ret)?;
            }
            Opcode::Sysreq => {
                let index = usize::try_from(operand).map_err(|_| VmError::Callback)?;
                let native = ctx.native(index).ok_or(VmError::Callback)?;
                ctx.pri = native(ctx)?;
            }
            // resume point is the instruction after the sleep
            Opcode::Sleep => return Ok(Some(Halt::Sleep(ctx.pri))),
            Opcode::Break => {
                if ctx.monitor_hook().is_none() && ctx.abort_state().is_hook_requested() {
                    let hook = ctx.abort_state().hook();
                    ctx.set_monitor_hook(hook);
                }
                if let Some(hook) = ctx.monitor_hook() {
                    if hook(ctx) == Checkpoint::Abort {
                        return Err(VmError::Exit);
                    }
                }
            }
        }
        Ok(None)
    }
}

impl Engine for Interpreter {
    fn exec(
        &self,
        ctx: &mut Context,
        entry: Entry,
    ) -> Outcome {
        let program = Rc::clone(ctx.program());
        // a public called on a parked context returns to the parked state
        let parked = (ctx.cip, ctx.reset_stk, ctx.reset_hea, ctx.sleeping);

        let started = match entry {
            Entry::Continue => {
                if !ctx.sleeping {
                    return Outcome::Fatal(VmError::InvalidState);
                }
                Ok(())
            }
            Entry::Main => match program.main {
                Some(address) => self.enter(ctx, address),
                None => return Outcome::NoEntryPoint,
            },
            Entry::Public(index) => match program.publics.get(index) {
                Some(public) => self.enter(ctx, public.address),
                None => return Outcome::Fatal(VmError::Index),
            },
        };
        ctx.sleeping = false;
        if let Err(err) = started {
            return Outcome::Fatal(err);
        }

        match self.execute(ctx) {
            Ok(Halt::Return(value)) => {
                ctx.stk = ctx.reset_stk;
                ctx.hea = ctx.reset_hea;
                if entry != Entry::Continue {
                    (ctx.cip, ctx.reset_stk, ctx.reset_hea, ctx.sleeping) = parked;
                }
                Outcome::Success(value)
            }
            Ok(Halt::Sleep(delay)) => {
                ctx.sleeping = true;
                debug!(cip = ctx.cip, delay, "program sleeping");
                Outcome::Sleeping(delay)
            }
            Err(err) => {
                debug!(cip = ctx.cip, code = err.code(), "execution fault: {}", err);
                Outcome::Fatal(err)
            }
        }
    }
}
