//! Execution context
//!
//! The complete resumable state of one running program: registers, data
//! memory (initialized data, heap growing up, stack growing down), resolved
//! natives, the user data registry and the monitor hook.
//!
//! Data memory is a shared region. A [`ContextSnapshot`] copies the registers
//! but keeps the region, so globals written by idle-time code are seen by the
//! program once it resumes.
//!
//! ```text
//! 0          hlw        hea            stk          stp
//! | data ... | heap --> |    free      | <-- stack  |
//! ```

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::runtime::interrupt::AbortState;
use crate::runtime::userdata::UserDataRegistry;
use crate::vm::errors::{VMResult, VmError};
use crate::vm::program::{Cell, Program, CELL_SIZE};

/// Native function callback. Arguments are read from PRI/ALT; the result
/// lands in PRI.
pub type NativeFn = fn(&mut Context) -> VMResult<Cell>;

/// Checkpoint hook invoked by the engine at every `BREAK`.
pub type MonitorHook = fn(&mut Context) -> Checkpoint;

/// Verdict of a checkpoint hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Abort,
}

/// 执行上下文
pub struct Context {
    program: Rc<Program>,
    natives: Vec<Option<NativeFn>>,
    memory: Rc<RefCell<Vec<Cell>>>,

    pub pri: Cell,
    pub alt: Cell,
    pub(crate) cip: usize,
    pub(crate) frm: usize,
    pub(crate) stk: usize,
    pub(crate) stp: usize,
    pub(crate) hea: usize,
    pub(crate) hlw: usize,

    /// Stack/heap to restore when an entry point returns
    pub(crate) reset_stk: usize,
    pub(crate) reset_hea: usize,
    pub(crate) sleeping: bool,

    user_data: UserDataRegistry,
    monitor: Option<MonitorHook>,
    abort: Arc<AbortState>,
}

impl Context {
    /// Lay out `program` in `memory_size` bytes of data memory.
    pub fn new(
        program: Rc<Program>,
        memory_size: usize,
    ) -> VMResult<Self> {
        let cells = memory_size / CELL_SIZE;
        let stp = cells * CELL_SIZE;
        let hlw = program.data_size();
        // Room for at least the entry frame.
        if hlw + 2 * CELL_SIZE > stp {
            return Err(VmError::Memory);
        }

        let mut memory = vec![0; cells];
        memory[..program.data.len()].copy_from_slice(&program.data);

        debug!(
            code = program.code_size(),
            data = hlw,
            memory = stp,
            "context created"
        );

        Ok(Self {
            natives: vec![None; program.natives.len()],
            program,
            memory: Rc::new(RefCell::new(memory)),
            pri: 0,
            alt: 0,
            cip: 0,
            frm: stp,
            stk: stp,
            stp,
            hea: hlw,
            hlw,
            reset_stk: stp,
            reset_hea: hlw,
            sleeping: false,
            user_data: UserDataRegistry::new(),
            monitor: None,
            abort: AbortState::global(),
        })
    }

    /// Replace the abort state this context observes.
    pub fn with_abort_state(
        mut self,
        abort: Arc<AbortState>,
    ) -> Self {
        self.abort = abort;
        self
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    /// Program counter (byte address into code)
    pub fn cip(&self) -> usize {
        self.cip
    }

    pub fn frm(&self) -> usize {
        self.frm
    }

    /// Stack pointer
    pub fn stk(&self) -> usize {
        self.stk
    }

    /// Stack top
    pub fn stp(&self) -> usize {
        self.stp
    }

    /// Heap pointer
    pub fn hea(&self) -> usize {
        self.hea
    }

    /// Heap low-water mark
    pub fn hlw(&self) -> usize {
        self.hlw
    }

    pub fn stack_usage(&self) -> usize {
        self.stp - self.stk
    }

    pub fn heap_usage(&self) -> usize {
        self.hea - self.hlw
    }

    /// Whether the last run ended in a resumable sleep
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn user_data(&self) -> &UserDataRegistry {
        &self.user_data
    }

    pub fn user_data_mut(&mut self) -> &mut UserDataRegistry {
        &mut self.user_data
    }

    pub fn abort_state(&self) -> &AbortState {
        &self.abort
    }

    pub fn monitor_hook(&self) -> Option<MonitorHook> {
        self.monitor
    }

    /// Install the checkpoint hook. Installing the same hook again is a no-op.
    pub fn set_monitor_hook(
        &mut self,
        hook: MonitorHook,
    ) {
        if self.monitor.is_some_and(|h| h as usize == hook as usize) {
            return;
        }
        debug!("monitor hook installed");
        self.monitor = Some(hook);
    }

    pub fn clear_monitor_hook(&mut self) {
        self.monitor = None;
    }

    /// Bind natives by name. Returns how many import slots were filled.
    pub fn register_natives(
        &mut self,
        exports: &[(&str, NativeFn)],
    ) -> usize {
        let mut bound = 0;
        for (slot, name) in self.natives.iter_mut().zip(&self.program.natives) {
            if let Some((_, f)) = exports.iter().find(|(n, _)| n == name) {
                *slot = Some(*f);
                bound += 1;
            }
        }
        bound
    }

    /// Fails with [`VmError::NotFound`] if any imported native is unbound.
    pub fn verify_natives(&self) -> VMResult<()> {
        match self.natives.iter().position(Option::is_none) {
            Some(idx) => {
                debug!(native = %self.program.natives[idx], "unresolved native");
                Err(VmError::NotFound)
            }
            None => Ok(()),
        }
    }

    pub(crate) fn native(
        &self,
        index: usize,
    ) -> Option<NativeFn> {
        self.natives.get(index).copied().flatten()
    }

    /// Copy the registers for use while this context is parked. Data memory
    /// and user data entries stay shared with this context.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot(Context {
            program: Rc::clone(&self.program),
            natives: self.natives.clone(),
            memory: Rc::clone(&self.memory),
            pri: self.pri,
            alt: self.alt,
            cip: self.cip,
            frm: self.frm,
            stk: self.stk,
            stp: self.stp,
            hea: self.hea,
            hlw: self.hlw,
            reset_stk: self.reset_stk,
            reset_hea: self.reset_hea,
            sleeping: self.sleeping,
            user_data: self.user_data.clone(),
            monitor: self.monitor,
            abort: Arc::clone(&self.abort),
        })
    }

    /// Whether `other` works on the same data memory
    pub fn shares_memory_with(
        &self,
        other: &Context,
    ) -> bool {
        Rc::ptr_eq(&self.memory, &other.memory)
    }

    fn check_address(
        &self,
        addr: usize,
    ) -> VMResult<usize> {
        if addr % CELL_SIZE != 0 || addr >= self.stp || (addr >= self.hea && addr < self.stk) {
            return Err(VmError::MemoryAccess);
        }
        Ok(addr / CELL_SIZE)
    }

    /// Read a cell from data memory
    pub fn read(
        &self,
        addr: usize,
    ) -> VMResult<Cell> {
        let idx = self.check_address(addr)?;
        Ok(self.memory.borrow()[idx])
    }

    /// Write a cell to data memory
    pub fn write(
        &mut self,
        addr: usize,
        value: Cell,
    ) -> VMResult<()> {
        let idx = self.check_address(addr)?;
        self.memory.borrow_mut()[idx] = value;
        Ok(())
    }

    pub(crate) fn push(
        &mut self,
        value: Cell,
    ) -> VMResult<()> {
        if self.stk < self.hea + CELL_SIZE {
            return Err(VmError::StackError);
        }
        self.stk -= CELL_SIZE;
        self.memory.borrow_mut()[self.stk / CELL_SIZE] = value;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> VMResult<Cell> {
        if self.stk >= self.stp {
            return Err(VmError::StackLow);
        }
        let value = self.memory.borrow()[self.stk / CELL_SIZE];
        self.stk += CELL_SIZE;
        Ok(value)
    }
}

impl fmt::Debug for Context {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Context")
            .field("pri", &self.pri)
            .field("alt", &self.alt)
            .field("cip", &self.cip)
            .field("frm", &self.frm)
            .field("stk", &self.stk)
            .field("stp", &self.stp)
            .field("hea", &self.hea)
            .field("hlw", &self.hlw)
            .field("sleeping", &self.sleeping)
            .field("user_data", &self.user_data)
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

/// Register copy of a parked context.
///
/// Lets the idle handler run code (public functions) against the program
/// without moving the program counter, stack or heap pointers of the context
/// that is waiting to be resumed. Code run on a snapshot uses the stack below
/// the parked frames and the heap above the parked allocations. There is no
/// way to turn a snapshot back into the context it was taken from; it is
/// dropped once the idle cycle is over.
#[derive(Debug)]
pub struct ContextSnapshot(Context);

impl Deref for ContextSnapshot {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ContextSnapshot {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
