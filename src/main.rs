//! Command line driver: compile a BF file and run it on stdin/stdout.

use bfvm::{
    compile, decompile, execute, format_diagnostic, parse_with, EofPolicy, Error, Level,
    OptimisationsFlags, Settings, DEFAULT_FLUSH_THRESHOLD, DEFAULT_TAPE_SIZE,
};
use clap::{Parser, ValueEnum};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EofArg {
    /// Store 0 in the cell.
    Zero,
    /// Store 255 in the cell.
    MinusOne,
    /// Stop with an error.
    Error,
}

impl From<EofArg> for EofPolicy {
    fn from(arg: EofArg) -> Self {
        match arg {
            EofArg::Zero => EofPolicy::Sentinel(0),
            EofArg::MinusOne => EofPolicy::Sentinel(255),
            EofArg::Error => EofPolicy::Fail,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "bfvm", version, about = "An optimizing BF bytecode compiler and VM")]
struct Cli {
    /// BF source file to run
    file: PathBuf,

    /// What `,` stores once stdin is exhausted
    #[arg(long, value_enum, default_value = "zero")]
    eof: EofArg,

    /// Number of cells on the tape
    #[arg(long, default_value_t = DEFAULT_TAPE_SIZE)]
    tape_size: usize,

    /// Buffer this many output bytes before writing to stdout
    #[arg(long, default_value_t = DEFAULT_FLUSH_THRESHOLD)]
    flush_threshold: usize,

    /// Stop after executing this many bytecode instructions
    #[arg(long)]
    max_steps: Option<u64>,

    /// Disable the peephole optimizer
    #[arg(long)]
    no_optimize: bool,

    /// Print the optimized instructions instead of running
    #[arg(long)]
    dump_ir: bool,

    /// Print the bytecode listing instead of running
    #[arg(long)]
    dump_bytecode: bool,

    /// Print equivalent BF source for the optimized program instead of running
    #[arg(long)]
    decompile: bool,

    /// Report code the optimizer removed as dead
    #[arg(short = 'W', long)]
    warnings: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let path = cli.file.display().to_string();

    let source = match fs::read(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!(
                "{}",
                format_diagnostic(
                    Level::Error,
                    &format!("could not read file: {}", e),
                    &path,
                    &[],
                    None
                )
            );
            process::exit(2);
        }
    };

    if let Err(e) = run(&cli, &path, &source) {
        let message = if e.is_internal() {
            format!("internal error, this is a bug: {}", e)
        } else {
            e.to_string()
        };
        eprintln!(
            "{}",
            format_diagnostic(Level::Error, &message, &path, &source, e.position())
        );
        process::exit(if e.is_internal() { 3 } else { 1 });
    }
}

fn run(cli: &Cli, path: &str, source: &[u8]) -> Result<(), Error> {
    let flags = if cli.no_optimize {
        OptimisationsFlags::empty()
    } else {
        OptimisationsFlags::all()
    };

    let (chunk, warnings) = parse_with(source, flags)?;
    if cli.warnings {
        for warning in &warnings {
            eprintln!(
                "{}",
                format_diagnostic(
                    Level::Warning,
                    &warning.message,
                    path,
                    source,
                    warning.position
                )
            );
        }
    }

    if cli.dump_ir {
        println!("{}", chunk);
        return Ok(());
    }
    if cli.decompile {
        println!("{}", decompile(&chunk));
        return Ok(());
    }

    let bytecode = compile(&chunk)?;
    if cli.dump_bytecode {
        println!("{}", bytecode);
        return Ok(());
    }

    let settings = Settings::default()
        .with_tape_size(cli.tape_size)
        .with_flush_threshold(cli.flush_threshold)
        .with_eof(cli.eof.into())
        .with_step_limit(cli.max_steps);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let state = execute(&bytecode, stdin.lock(), stdout.lock(), settings)?;
    log::debug!("{} halted after {} steps", path, state.steps);
    Ok(())
}
