//! Property tests: for arbitrary well-formed programs, the optimizer must
//! never change what a program does, and must be idempotent.

use crate::bytecode::compile;
use crate::chunk::decompile;
use crate::execution::{execute, RuntimeError, Settings};
use crate::parser::{parse, parse_with, ParseError};
use crate::peephole::{optimize, OptimisationsFlags};
use quickcheck::{quickcheck, Arbitrary, Gen, TestResult};
use std::fmt;

const MAX_STEPS: u64 = 10_000;
const TAPE_SIZE: usize = 64;

/// A BF program with balanced brackets.
#[derive(Clone)]
struct BalancedProgram(String);

impl fmt::Debug for BalancedProgram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

fn arbitrary_body<G: Gen>(g: &mut G, depth: usize, out: &mut String) {
    let len = usize::arbitrary(g) % 12;
    for _ in 0..len {
        match u8::arbitrary(g) % 10 {
            0 | 1 => out.push('+'),
            2 => out.push('-'),
            3 => out.push('>'),
            4 => out.push('<'),
            5 => out.push('.'),
            6 => out.push(','),
            7 => out.push_str("[-]"),
            _ if depth < 3 => {
                out.push('[');
                arbitrary_body(g, depth + 1, out);
                out.push(']');
            }
            _ => out.push('+'),
        }
    }
}

impl Arbitrary for BalancedProgram {
    fn arbitrary<G: Gen>(g: &mut G) -> Self {
        let mut source = String::new();
        // Start a little way into the tape so that `<` is usually safe.
        source.push_str(">>>>");
        arbitrary_body(g, 0, &mut source);
        BalancedProgram(source)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        // Dropping any single non-bracket symbol keeps the brackets
        // balanced.
        let source = self.0.clone();
        Box::new(
            source
                .char_indices()
                .filter(|&(i, c)| i >= 4 && c != '[' && c != ']')
                .map(|(i, _)| {
                    let mut shrunk = source.clone();
                    shrunk.remove(i);
                    BalancedProgram(shrunk)
                })
                .collect::<Vec<_>>()
                .into_iter(),
        )
    }
}

enum Outcome {
    Halted(Vec<u8>),
    /// Ran off the tape or out of steps; nothing to compare.
    Inconclusive,
}

fn run(source: &[u8], flags: OptimisationsFlags, input: &[u8]) -> Outcome {
    let (chunk, _) = parse_with(source, flags).unwrap();
    let bytecode = compile(&chunk).unwrap();
    let settings = Settings::default()
        .with_tape_size(TAPE_SIZE)
        .with_step_limit(Some(MAX_STEPS));

    let mut output: Vec<u8> = vec![];
    match execute(&bytecode, input, &mut output, settings) {
        Ok(_) => Outcome::Halted(output),
        Err(RuntimeError::TapeOutOfBounds { .. })
        | Err(RuntimeError::StepLimitExceeded { .. }) => Outcome::Inconclusive,
        Err(e) => panic!("unexpected runtime error: {}", e),
    }
}

#[test]
fn balanced_programs_always_parse() {
    fn prop(program: BalancedProgram) -> bool {
        match parse(program.0.as_bytes()) {
            Ok(_) => true,
            Err(ParseError::UnmatchedCloseBracket { .. })
            | Err(ParseError::UnclosedLoop { .. }) => false,
            Err(e) => panic!("internal error: {}", e),
        }
    }
    quickcheck(prop as fn(BalancedProgram) -> bool);
}

#[test]
fn optimize_should_be_idempotent() {
    fn prop(program: BalancedProgram) -> bool {
        let chunk = parse(program.0.as_bytes()).unwrap();
        optimize(&chunk, OptimisationsFlags::all()).unwrap() == chunk
    }
    quickcheck(prop as fn(BalancedProgram) -> bool);
}

#[test]
fn optimize_should_match_unoptimized_output() {
    fn prop(program: BalancedProgram, input: Vec<u8>) -> TestResult {
        let source = program.0.as_bytes();
        let expected = match run(source, OptimisationsFlags::empty(), &input) {
            Outcome::Halted(output) => output,
            Outcome::Inconclusive => return TestResult::discard(),
        };

        match run(source, OptimisationsFlags::all(), &input) {
            Outcome::Halted(output) => TestResult::from_bool(output == expected),
            Outcome::Inconclusive => TestResult::failed(),
        }
    }
    quickcheck(prop as fn(BalancedProgram, Vec<u8>) -> TestResult);
}

#[test]
fn decompile_should_preserve_output() {
    fn prop(program: BalancedProgram, input: Vec<u8>) -> TestResult {
        let source = program.0.as_bytes();
        let expected = match run(source, OptimisationsFlags::all(), &input) {
            Outcome::Halted(output) => output,
            Outcome::Inconclusive => return TestResult::discard(),
        };

        let decompiled = decompile(&parse(source).unwrap());
        match run(decompiled.as_bytes(), OptimisationsFlags::empty(), &input) {
            Outcome::Halted(output) => TestResult::from_bool(output == expected),
            Outcome::Inconclusive => TestResult::discard(),
        }
    }
    quickcheck(prop as fn(BalancedProgram, Vec<u8>) -> TestResult);
}
