//! Stack/heap high-water mark collection
//!
//! [`monitor`] is the checkpoint hook. It records usage into the
//! [`DiagnosticsRecord`] registered under [`Tag::STACK_INFO`] (if any) and
//! turns a pending abort request into [`Checkpoint::Abort`].

use std::cell::Cell;
use std::rc::Rc;

use crate::runtime::userdata::Tag;
use crate::vm::context::{Checkpoint, Context};
use crate::vm::errors::VMResult;
use crate::vm::program::CELL_SIZE;

/// Maximum stack and heap usage in bytes.
#[derive(Debug, Default)]
pub struct DiagnosticsRecord {
    max_stack: Cell<usize>,
    max_heap: Cell<usize>,
}

impl DiagnosticsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_stack_bytes(&self) -> usize {
        self.max_stack.get()
    }

    pub fn max_heap_bytes(&self) -> usize {
        self.max_heap.get()
    }

    pub fn max_stack_cells(&self) -> usize {
        self.max_stack.get() / CELL_SIZE
    }

    pub fn max_heap_cells(&self) -> usize {
        self.max_heap.get() / CELL_SIZE
    }

    /// Whether anything was recorded
    pub fn is_empty(&self) -> bool {
        self.max_stack.get() == 0 && self.max_heap.get() == 0
    }

    /// Fold one sample into the maxima.
    pub fn sample(
        &self,
        stack: usize,
        heap: usize,
    ) {
        if stack > self.max_stack.get() {
            self.max_stack.set(stack);
        }
        if heap > self.max_heap.get() {
            self.max_heap.set(heap);
        }
    }
}

/// Register a fresh record on `ctx` and install the monitor hook so usage is
/// tracked from the first checkpoint.
pub fn enable(ctx: &mut Context) -> VMResult<Rc<DiagnosticsRecord>> {
    let record = Rc::new(DiagnosticsRecord::new());
    ctx.user_data_mut()
        .set(Tag::STACK_INFO, Rc::clone(&record))?;
    ctx.set_monitor_hook(monitor);
    Ok(record)
}

/// Checkpoint hook: sample usage, report a pending abort.
pub fn monitor(ctx: &mut Context) -> Checkpoint {
    if let Some(record) = ctx
        .user_data()
        .get::<DiagnosticsRecord>(Tag::STACK_INFO)
    {
        record.sample(ctx.stack_usage(), ctx.heap_usage());
    }

    if ctx.abort_state().is_aborted() {
        Checkpoint::Abort
    } else {
        Checkpoint::Continue
    }
}
