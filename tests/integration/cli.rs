//! `coopvm` binary
//!
//! Runs the built binary against images written to a temporary directory.
//! The config directory points into the same directory so a user config on
//! the test machine cannot change the outcome.

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use coopvm::vm::builder::{Instr, ProgramBuilder};
use coopvm::vm::Program;

fn command(
    dir: &Path,
    args: &[&str],
) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_coopvm"));
    cmd.args(args)
        .current_dir(dir)
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("COOPVM_MEMORY_SIZE")
        .env_remove("COOPVM_DEFAULT_EXTENSION")
        .env_remove("COOPVM_SNAPSHOT_POLICY")
        .env_remove("COOPVM_LOG");
    cmd
}

fn coopvm(
    dir: &Path,
    args: &[&str],
) -> Output {
    command(dir, args)
        .output()
        .expect("Failed to spawn coopvm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn save(
    dir: &Path,
    name: &str,
    program: Program,
) {
    program.save(&dir.join(name)).unwrap();
}

fn returning(value: i32) -> Program {
    let mut b = ProgramBuilder::new();
    b.main()
        .emit_all(&[Instr::Proc, Instr::ConstPri(value), Instr::Ret]);
    b.build().unwrap()
}

#[test]
fn test_success_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), "answer.cvm", returning(42));

    let output = coopvm(dir.path(), &["answer"]);
    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.contains("Return value: 42"));
    assert!(text.contains("Run time:"));
    assert!(!text.contains("Stack usage:"));
}

#[test]
fn test_zero_return_value_is_not_printed() {
    let dir = tempfile::tempdir().unwrap();
    save(dir.path(), "zero.cvm", returning(0));

    let output = coopvm(dir.path(), &["zero.cvm"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(!stdout(&output).contains("Return value"));
}

/// Fault without debug information: code and address only
#[test]
fn test_fault_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = ProgramBuilder::new();
    b.main()
        .emit_all(&[Instr::Proc, Instr::ConstPri(1), Instr::ConstAlt(0)]);
    while b.here() < 0x1A4 {
        b.emit(Instr::Nop);
    }
    b.emit_all(&[Instr::Sdiv, Instr::Ret]);
    save(dir.path(), "div.cvm", b.build().unwrap());

    let output = coopvm(dir.path(), &["div"]);
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("Run time error 11: \"divide by zero\" on address 420"));
    assert!(!text.contains("File:"));
    assert!(!text.contains("Run time:"));
}

#[test]
fn test_missing_file_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let output = coopvm(dir.path(), &["nothing"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage"));
}

#[test]
fn test_no_arguments_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let output = coopvm(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage"));
}

/// `-stack` anywhere on the line enables the usage report
#[test]
fn test_stack_flag() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = ProgramBuilder::new();
    b.main().emit(Instr::Proc);
    b.line("usage.p", 1);
    b.emit_all(&[Instr::PushC(3), Instr::PopPri, Instr::Ret]);
    save(dir.path(), "usage.cvm", b.build().unwrap());

    for args in [&["-stack", "usage"][..], &["usage", "-stack"][..]] {
        let output = coopvm(dir.path(), args);
        assert_eq!(output.status.code(), Some(0));
        let text = stdout(&output);
        assert!(text.contains("Stack usage:"));
        assert!(text.contains("Heap usage:"));
    }
}

/// Arguments after the image are visible to the program
#[test]
fn test_program_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = ProgramBuilder::new();
    let numargs = b.native("numargs");
    b.main()
        .emit_all(&[Instr::Proc, Instr::Sysreq(numargs), Instr::Ret]);
    save(dir.path(), "args.cvm", b.build().unwrap());

    let output = coopvm(dir.path(), &["args", "1", "-x", "three"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Return value: 3"));
}

/// A one-shot timer fires its handler while `main` sleeps
#[test]
fn test_timer_fires_during_sleep() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = ProgramBuilder::new();
    let settimer = b.native("settimer");
    let print = b.native("print");
    b.main().emit_all(&[
        Instr::Proc,
        Instr::ConstAlt(0),
        Instr::ConstPri(10),
        Instr::Sysreq(settimer),
        Instr::ConstPri(80),
        Instr::Sleep,
        Instr::ConstPri(0),
        Instr::Ret,
    ]);
    b.public("@timer").unwrap();
    b.emit_all(&[Instr::Proc, Instr::ConstPri(7707), Instr::Sysreq(print), Instr::Ret]);
    save(dir.path(), "timer.cvm", b.build().unwrap());

    let output = coopvm(dir.path(), &["timer"]);
    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert_eq!(text.matches("7707").count(), 1);
    assert!(text.contains("Run time:"));
}

/// No `main` and no armed timer: nothing to serve, clean exit
#[test]
fn test_event_driven_program_exits() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = ProgramBuilder::new();
    b.public("@timer").unwrap();
    b.emit_all(&[Instr::Proc, Instr::Ret]);
    save(dir.path(), "events.cvm", b.build().unwrap());

    let output = coopvm(dir.path(), &["events"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_unresolved_native_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = ProgramBuilder::new();
    let missing = b.native("no_such_native");
    b.main()
        .emit_all(&[Instr::Proc, Instr::Sysreq(missing), Instr::Ret]);
    save(dir.path(), "native.cvm", b.build().unwrap());

    let output = coopvm(dir.path(), &["native"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Run time error"));
}

#[test]
fn test_unknown_flag_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let output = coopvm(dir.path(), &["--bogus"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage"));
}

#[test]
fn test_help_and_version_succeed() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(coopvm(dir.path(), &["--help"]).status.code(), Some(0));
    assert_eq!(coopvm(dir.path(), &["--version"]).status.code(), Some(0));
}

/// A public count far past the end of the file is a load error, not a crash
#[test]
fn test_corrupt_image_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = ProgramBuilder::new();
    b.main().emit_all(&[Instr::Proc, Instr::Ret]);
    let mut bytes = Vec::new();
    b.build().unwrap().write_to(&mut bytes).unwrap();
    // publics count follows magic, version, flags, main and both cell blocks
    let code_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    let at = 16 + code_len * 4 + 4;
    bytes[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    std::fs::write(dir.path().join("corrupt.cvm"), &bytes).unwrap();

    let output = coopvm(dir.path(), &["corrupt.cvm"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Usage"));
}

/// Ctrl-C stops a busy program at its next checkpoint
#[cfg(unix)]
#[test]
fn test_sigint_forces_exit() {
    let dir = tempfile::tempdir().unwrap();
    let mut b = ProgramBuilder::new();
    let top = b.label();
    b.main().emit(Instr::Proc);
    b.bind(top).unwrap();
    b.line("spin.p", 3);
    b.emit(Instr::Jump(top));
    save(dir.path(), "spin.cvm", b.build().unwrap());

    let child = command(dir.path(), &["spin"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn coopvm");
    let pid = child.id() as libc::pid_t;

    thread::sleep(Duration::from_millis(500));
    unsafe {
        libc::kill(pid, libc::SIGINT);
    }
    thread::sleep(Duration::from_millis(50));
    // a second delivery finds the handler still installed
    unsafe {
        libc::kill(pid, libc::SIGINT);
    }

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("\"forced exit\""));
}
