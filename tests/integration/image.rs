//! Program images on disk
//!
//! Loading with the suffix retry, and fault locations resolved lazily from
//! the debug section of the image.

use std::fs;
use std::path::{Path, PathBuf};

use coopvm::vm::builder::{Instr, ProgramBuilder};
use coopvm::vm::Program;
use coopvm::{load_program, run_file, with_suffix, RunOptions};

fn answer() -> Program {
    let mut b = ProgramBuilder::new();
    b.main()
        .emit_all(&[Instr::Proc, Instr::ConstPri(42), Instr::Ret]);
    b.build().unwrap()
}

/// Divide by zero on line 7 of `calc.p`
fn faulty() -> Program {
    let mut b = ProgramBuilder::new();
    b.main().emit(Instr::Proc);
    b.line("calc.p", 6);
    b.emit_all(&[Instr::ConstPri(1), Instr::ConstAlt(0)]);
    b.line("calc.p", 7);
    b.emit_all(&[Instr::Sdiv, Instr::Ret]);
    b.build().unwrap()
}

#[test]
fn test_suffix_appended() {
    let path = Path::new("demo/blink");
    assert_eq!(with_suffix(path, "cvm"), PathBuf::from("demo/blink.cvm"));
    assert_eq!(with_suffix(path, ".cvm"), PathBuf::from("demo/blink.cvm"));
}

/// `blink` is found as `blink.cvm`
#[test]
fn test_load_retries_with_suffix() {
    let dir = tempfile::tempdir().unwrap();
    answer().save(&dir.path().join("blink.cvm")).unwrap();

    let (image, program) = load_program(&dir.path().join("blink"), "cvm").unwrap();
    assert_eq!(image, dir.path().join("blink.cvm"));
    assert_eq!(program.main, answer().main);
}

#[test]
fn test_load_exact_path_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("answer.img");
    answer().save(&path).unwrap();

    let (image, _) = load_program(&path, "cvm").unwrap();
    assert_eq!(image, path);
}

#[test]
fn test_load_failure_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing");
    let err = load_program(&path, "cvm").unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load program"));
}

/// A corrupt file is not retried past the one suffix attempt
#[test]
fn test_corrupt_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.cvm");
    fs::write(&path, b"not a program image").unwrap();
    assert!(load_program(&path, "cvm").is_err());
}

#[test]
fn test_run_file_success() {
    let dir = tempfile::tempdir().unwrap();
    answer().save(&dir.path().join("answer.cvm")).unwrap();

    let report = run_file(&dir.path().join("answer"), &RunOptions::default()).unwrap();
    assert_eq!(report.value, 42);
    assert!(report.summary().contains("Return value: 42"));
}

/// The debug section is skipped at load time and read back for the report
#[test]
fn test_run_file_fault_reports_source_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calc.cvm");
    faulty().save(&path).unwrap();

    let err = run_file(&path, &RunOptions::default()).unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("Run time error 11: \"divide by zero\" on address"));
    assert!(text.ends_with("File: calc.p, line: 7"));
}

#[test]
fn test_stack_usage_from_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usage.cvm");
    let mut b = ProgramBuilder::new();
    b.main().emit(Instr::Proc);
    b.line("usage.p", 1);
    b.emit_all(&[Instr::PushC(1), Instr::PushC(2)]);
    b.line("usage.p", 2);
    b.emit_all(&[Instr::PopPri, Instr::PopPri, Instr::Ret]);
    b.build().unwrap().save(&path).unwrap();

    let options = RunOptions {
        monitor_stack: true,
        ..RunOptions::default()
    };
    let report = run_file(&path, &options).unwrap();
    assert_eq!(report.value, 1);
    assert!(report.has_usage());
    assert!(report.max_stack_bytes >= 8);
    assert!(report.summary().contains("Stack usage:"));
}
