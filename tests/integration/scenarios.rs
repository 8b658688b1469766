//! End-to-end driver scenarios
//!
//! Programs are assembled with the builder and driven the way the host binary
//! drives them. Every context gets its own abort state so these tests never
//! touch the process-wide one.

use std::cell::Cell as Counter;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use coopvm::runtime::interrupt::AbortState;
use coopvm::runtime::reporter::FaultReporter;
use coopvm::runtime::scheduler::{Driver, IdleFunction, IdleStatus};
use coopvm::vm::builder::{Instr, ProgramBuilder};
use coopvm::vm::{Context, Engine, Entry, Interpreter, Outcome, Program, VmError};
use coopvm::{RunOptions, Session};

fn context(program: Program) -> (Context, Arc<AbortState>) {
    let abort = Arc::new(AbortState::new());
    let ctx = Interpreter::new()
        .context(Rc::new(program))
        .unwrap()
        .with_abort_state(Arc::clone(&abort));
    (ctx, abort)
}

fn returning(value: i32) -> Program {
    let mut b = ProgramBuilder::new();
    b.main()
        .emit_all(&[Instr::Proc, Instr::ConstPri(value), Instr::Ret]);
    b.build().unwrap()
}

/// Returns 42 without ever sleeping
#[test]
fn test_program_without_sleep() {
    let (mut ctx, _) = context(returning(42));
    let mut driver = Driver::new(Interpreter::new());
    assert_eq!(driver.execute(&mut ctx), Ok(42));
    assert_eq!(driver.stats().sleeps, 0);
}

/// One 100ms sleep; the idle function gives up after three rounds
#[test]
fn test_single_sleep_with_short_idle() {
    let mut b = ProgramBuilder::new();
    b.main().emit_all(&[
        Instr::Proc,
        Instr::ConstPri(100),
        Instr::Sleep,
        Instr::ConstPri(0),
        Instr::Ret,
    ]);
    let (mut ctx, _) = context(b.build().unwrap());

    let calls = Rc::new(Counter::new(0usize));
    let seen = Rc::clone(&calls);
    IdleFunction::new(move |_: &mut Context, _: &dyn Engine| {
        seen.set(seen.get() + 1);
        if seen.get() <= 3 {
            IdleStatus::Continue
        } else {
            IdleStatus::Done
        }
    })
    .install(&mut ctx)
    .unwrap();

    let mut driver = Driver::new(Interpreter::new());
    assert_eq!(driver.execute(&mut ctx), Ok(0));
    assert!(calls.get() >= 1 && calls.get() <= 4);
    assert_eq!(driver.stats().sleeps, 1);
    assert_eq!(driver.stats().resumes, 1);
}

/// Divide fault at 0x1A4 in a program without debug information
#[test]
fn test_fault_without_debug_info() {
    let mut b = ProgramBuilder::new();
    b.main()
        .emit_all(&[Instr::Proc, Instr::ConstPri(1), Instr::ConstAlt(0)]);
    while b.here() < 0x1A4 {
        b.emit(Instr::Nop);
    }
    b.emit_all(&[Instr::Sdiv, Instr::Ret]);
    let program = b.build().unwrap();
    assert!(!program.has_debug_info());

    let (mut ctx, _) = context(program);
    let fault = Driver::new(Interpreter::new())
        .execute(&mut ctx)
        .unwrap_err();
    assert_eq!(fault.error, VmError::Divide);
    assert_eq!(fault.cip, 0x1A4);

    let text = FaultReporter::new().render(&fault, ctx.program());
    assert_eq!(text, "Run time error 11: \"divide by zero\" on address 420\n");
}

/// An abort requested from another thread stops a busy program
#[test]
fn test_abort_from_another_thread() {
    let mut b = ProgramBuilder::new();
    let top = b.label();
    b.main().emit(Instr::Proc);
    b.bind(top).unwrap();
    b.line("spin.p", 1);
    b.emit(Instr::Jump(top));
    let (mut ctx, abort) = context(b.build().unwrap());

    let remote = Arc::clone(&abort);
    let signaller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        remote.request();
        remote.request();
    });

    let mut driver = Driver::new(Interpreter::new());
    let fault = driver.execute(&mut ctx).unwrap_err();
    signaller.join().unwrap();

    assert!(fault.error.is_abort());
    assert_eq!(driver.stats().resumes, 0);
    assert!(abort.is_aborted());
}

/// No `main`: the idle function serves events until it is done
#[test]
fn test_event_driven_program() {
    let mut b = ProgramBuilder::new();
    b.public("@event").unwrap();
    b.emit_all(&[Instr::Proc, Instr::ConstPri(1), Instr::Ret]);
    let (mut ctx, _) = context(b.build().unwrap());

    let served = Rc::new(Counter::new(0usize));
    let seen = Rc::clone(&served);
    IdleFunction::new(move |ctx: &mut Context, engine: &dyn Engine| {
        if seen.get() == 5 {
            return IdleStatus::Done;
        }
        seen.set(seen.get() + 1);
        match engine.exec(ctx, Entry::Public(0)) {
            Outcome::Success(_) => IdleStatus::Continue,
            Outcome::Fatal(error) => IdleStatus::Error(error),
            _ => IdleStatus::Error(VmError::General),
        }
    })
    .install(&mut ctx)
    .unwrap();

    let mut driver = Driver::new(Interpreter::new());
    assert_eq!(driver.execute(&mut ctx), Ok(0));
    assert_eq!(served.get(), 5);
    assert_eq!(driver.stats().idle_calls, 6);
}

/// The time extension keeps the host idle for the full sleep
#[test]
fn test_session_sleep_lasts_requested_delay() {
    let mut b = ProgramBuilder::new();
    b.main().emit_all(&[
        Instr::Proc,
        Instr::ConstPri(30),
        Instr::Sleep,
        Instr::ConstPri(5),
        Instr::Ret,
    ]);
    let program = Rc::new(b.build().unwrap());

    let started = Instant::now();
    let mut session = Session::new(program, &RunOptions::default()).unwrap();
    let report = session.run().unwrap();

    assert_eq!(report.value, 5);
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(report.stats.resumes, 1);
    assert!(report.stats.idle_calls >= 1);
}
