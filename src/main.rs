//! coopvm - CLI

use std::ffi::OsString;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::error;

use coopvm::runtime::interrupt;
use coopvm::runtime::reporter::{FaultReporter, EXIT_FAILURE};
use coopvm::util::config::load_host_config;
use coopvm::util::logger::{self, LogLevel};
use coopvm::{load_program, RunOptions, Session, NAME, VERSION};

/// Run a compiled program, servicing its sleeps and timers
#[derive(Parser, Debug)]
#[command(name = "coopvm")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    /// Program image; `.cvm` is appended if the path does not load
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Monitor stack and heap usage (also accepted as `-stack`)
    #[arg(long)]
    stack: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Other options are passed to the program
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Accept the single-dash `-stack` spelling anywhere on the command line.
fn normalize(args: impl Iterator<Item = OsString>) -> Vec<OsString> {
    args.map(|a| if a == "-stack" { OsString::from("--stack") } else { a })
        .collect()
}

fn usage() -> ! {
    let _ = Args::command().print_help();
    println!();
    std::process::exit(EXIT_FAILURE)
}

fn main() -> Result<()> {
    let mut args = match Args::try_parse_from(normalize(std::env::args_os())) {
        Ok(args) => args,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                usage()
            }
        },
    };
    let config = load_host_config().context("Failed to load configuration")?;
    logger::init_with_level(if args.verbose {
        LogLevel::Debug
    } else {
        config.log.level
    });

    // `--stack` after the first program argument lands in `args`
    let before = args.args.len();
    args.args.retain(|a| a != "--stack");
    let monitor_stack = args.stack || args.args.len() != before;

    let Some(file) = args.file else { usage() };
    let (image, program) = match load_program(&file, &config.runtime.default_extension) {
        Ok(loaded) => loaded,
        Err(err) => {
            error!("{:#}", err);
            usage()
        }
    };
    let program = Rc::new(program);

    interrupt::install_signal_handler();

    let options = RunOptions {
        monitor_stack,
        args: args.args,
        ..RunOptions::from_config(&config)
    };
    let mut session = match Session::new(Rc::clone(&program), &options) {
        Ok(session) => session.with_image(&image),
        Err(fault) => FaultReporter::new()
            .with_image(&image)
            .exit_on_error(&fault, &program),
    };

    match session.run() {
        Ok(report) => print!("{}", report.summary()),
        Err(fault) => session
            .reporter()
            .exit_on_error(&fault, session.program()),
    }
    Ok(())
}
