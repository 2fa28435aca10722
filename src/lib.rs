#![warn(trivial_numeric_casts)]

//! bfvm is an optimizing compiler from BF source to a compact bytecode,
//! and a virtual machine that runs that bytecode.
//!
//! The pipeline runs each stage to completion before the next:
//! lex, parse and optimize into a `Chunk`, compile to `Bytecode`, execute.

pub use bytecode::{compile, Bytecode, CompileError, Opcode, Word};
pub use chunk::{decompile, Chunk};
pub use diagnostics::{format_diagnostic, Level, Position, Warning};
pub use execution::{
    execute, EofPolicy, ExecutionState, OutputBuffer, RuntimeError, Settings,
    DEFAULT_FLUSH_THRESHOLD, DEFAULT_TAPE_SIZE,
};
pub use instruction::{Capabilities, Cell, Instruction};
pub use lexer::Lexer;
pub use parser::{parse, parse_with, ParseError, Parser};
pub use peephole::{optimize, BuildError, ChunkBuilder, LoopRewrite, OptimisationsFlags};
pub use token::{Token, TokenKind};

use std::io::{Read, Write};
use thiserror::Error;

mod bytecode;
mod chunk;
mod diagnostics;
mod execution;
mod instruction;
mod lexer;
mod parser;
mod peephole;
mod token;

#[cfg(test)]
mod peephole_tests;
#[cfg(test)]
mod soundness_tests;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("internal compiler error: {0}")]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// Internal errors point at a bug in this crate rather than in the
    /// program being compiled or run.
    pub fn is_internal(&self) -> bool {
        match self {
            Error::Parse(ParseError::Builder(_)) => true,
            Error::Parse(_) => false,
            Error::Compile(_) => true,
            Error::Runtime(e) => e.is_internal(),
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            Error::Parse(e) => e.position(),
            _ => None,
        }
    }
}

/// Parse, optimize and compile `source` in one go.
pub fn compile_source(source: &[u8], flags: OptimisationsFlags) -> Result<Bytecode, Error> {
    let (chunk, _) = parse_with(source, flags)?;
    Ok(compile(&chunk)?)
}

/// Compile and execute `source`, returning the final machine state.
pub fn run<R: Read, W: Write>(
    source: &[u8],
    input: R,
    output: W,
    settings: Settings,
) -> Result<ExecutionState, Error> {
    let bytecode = compile_source(source, OptimisationsFlags::all())?;
    Ok(execute(&bytecode, input, output, settings)?)
}

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn run_round_trip() {
    let mut output: Vec<u8> = vec![];
    run(b"+++.", &b""[..], &mut output, Settings::default()).unwrap();
    assert_eq!(output, vec![3]);
}

#[test]
fn error_categories() {
    let unclosed = compile_source(b"[", OptimisationsFlags::all()).unwrap_err();
    assert!(!unclosed.is_internal());
    assert_eq!(unclosed.position(), Some(Position::new(1, 2)));

    let bounds = run(b"<+", &b""[..], std::io::sink(), Settings::default()).unwrap_err();
    assert!(!bounds.is_internal());
    assert_eq!(bounds.position(), None);

    assert!(Error::from(CompileError::UnbalancedDelimiters).is_internal());
    assert!(Error::from(ParseError::Builder(BuildError::EmptyPop)).is_internal());
}
