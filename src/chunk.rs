//! A `Chunk` is the finished, optimized instruction sequence. It can be
//! listed for humans or turned back into BF source.

use crate::instruction::Instruction::{self, *};
use itertools::Itertools;
use std::cmp::Ordering;
use std::fmt;
use std::num::Wrapping;
use std::ops::Index;

#[cfg(test)]
use crate::parser::parse;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// An immutable list of instructions. Only `ChunkBuilder::finalize`
/// creates one.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Chunk {
    instructions: Vec<Instruction>,
}

impl Chunk {
    pub(crate) fn new(instructions: Vec<Instruction>) -> Self {
        Chunk { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

impl Index<usize> for Chunk {
    type Output = Instruction;

    fn index(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }
}

impl<'a> IntoIterator for &'a Chunk {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            self.instructions
                .iter()
                .enumerate()
                .map(|(i, instr)| format!("{:4} {}", i, instr))
                .join("\n")
        )
    }
}

fn moves(diff: isize) -> String {
    match diff.cmp(&0) {
        Ordering::Less => "<".repeat((-diff) as usize),
        Ordering::Equal => "".to_owned(),
        Ordering::Greater => ">".repeat(diff as usize),
    }
}

fn incs(amount: i8) -> String {
    let amount = amount as i16;
    match amount.cmp(&0) {
        Ordering::Less => "-".repeat((-amount) as usize),
        Ordering::Equal => "".to_owned(),
        Ordering::Greater => "+".repeat(amount as usize),
    }
}

/// Given a chunk, decompile it back into BF source code.
pub fn decompile(chunk: &Chunk) -> String {
    let mut result = String::new();

    // Where the pointer is relative to the start of the current segment.
    let mut last_offset = 0;
    for instr in chunk {
        let offset = instr.offset();
        result.push_str(&moves(offset - last_offset));
        last_offset = offset;

        match *instr {
            ChangeValue { delta, .. } => result.push_str(&incs(delta.0)),
            SetAbsolute { value, .. } => {
                result.push_str("[-]");
                if value != Wrapping(0) {
                    result.push_str(&incs(value.0));
                }
            }
            InputByte { .. } => result.push(','),
            OutputByte { .. } => result.push('.'),
            LoopStart { .. } => {
                result.push('[');
                last_offset = 0;
            }
            LoopEnd { .. } => {
                result.push(']');
                last_offset = 0;
            }
        }
    }

    result
}

#[test]
fn chunk_listing() {
    let chunk = parse(b"+++>.").unwrap();
    assert_eq!(
        chunk.to_string(),
        "   0 change value at 0 by 3\n   1 output byte at 1"
    );
}

#[test]
fn empty_chunk_listing() {
    assert_eq!(Chunk::default().to_string(), "");
}

#[test]
fn decompile_simple() {
    let chunk = parse(b"++>-<<.").unwrap();
    assert_eq!(decompile(&chunk), "++>-<<.");
}

#[test]
fn decompile_loop_offsets() {
    let chunk = parse(b"+>>[->+<]<.").unwrap();
    assert_eq!(decompile(&chunk), "+>>[->+<]<.");
}

#[test]
fn decompile_set() {
    let chunk = parse(b",>+<[-]--.").unwrap();
    assert_eq!(decompile(&chunk), ",>+<[-]--.");
}

#[test]
fn decompile_extreme_cell() {
    let chunk = Chunk::new(vec![ChangeValue {
        delta: Wrapping(-128),
        offset: 0,
    }]);
    assert_eq!(decompile(&chunk), "-".repeat(128));
}
