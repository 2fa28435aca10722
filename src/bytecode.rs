//! Lowering of a finished `Chunk` into flat bytecode for the VM.
//!
//! Every instruction is an opcode followed by an offset, and for value
//! and jump instructions a third operand:
//!
//! ```text
//! [InputByte, offset]
//! [OutputByte, offset]
//! [ChangeValue, offset, amount]
//! [SetAbsolute, offset, value]
//! [JumpIfZero, offset, distance]
//! [JumpIfNotZero, offset, distance]
//! ```
//!
//! Both jumps of a loop carry the same distance: the number of words
//! between the end of the `JumpIfZero` and the end of the `JumpIfNotZero`.

use crate::chunk::Chunk;
use crate::instruction::Instruction::*;
use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

#[cfg(test)]
use crate::parser::parse;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// A single slot of bytecode.
pub type Word = isize;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Opcode {
    InputByte = 1,
    OutputByte = 2,
    ChangeValue = 3,
    SetAbsolute = 4,
    JumpIfZero = 5,
    JumpIfNotZero = 6,
}

impl Opcode {
    /// How many words the instruction occupies, opcode included.
    pub fn width(self) -> usize {
        match self {
            Opcode::InputByte | Opcode::OutputByte => 2,
            _ => 3,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Opcode::InputByte => "in",
            Opcode::OutputByte => "out",
            Opcode::ChangeValue => "add",
            Opcode::SetAbsolute => "set",
            Opcode::JumpIfZero => "jz",
            Opcode::JumpIfNotZero => "jnz",
        }
    }
}

impl TryFrom<Word> for Opcode {
    type Error = Word;

    fn try_from(word: Word) -> Result<Opcode, Word> {
        match word {
            1 => Ok(Opcode::InputByte),
            2 => Ok(Opcode::OutputByte),
            3 => Ok(Opcode::ChangeValue),
            4 => Ok(Opcode::SetAbsolute),
            5 => Ok(Opcode::JumpIfZero),
            6 => Ok(Opcode::JumpIfNotZero),
            other => Err(other),
        }
    }
}

/// Failures here mean the chunk was not produced by the parser, they are
/// never caused by bad source code.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum CompileError {
    #[error("chunk has loop starts without matching loop ends")]
    UnbalancedDelimiters,
    #[error("chunk has a loop end without a matching loop start")]
    UnmatchedLoopEnd,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Bytecode {
    words: Vec<Word>,
}

impl Bytecode {
    /// Wrap words produced elsewhere. The VM still checks every opcode and
    /// jump, but nothing here validates them up front.
    pub fn from_words(words: Vec<Word>) -> Self {
        Bytecode { words }
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

pub fn compile(chunk: &Chunk) -> Result<Bytecode, CompileError> {
    let mut words: Vec<Word> = Vec::with_capacity(chunk.len() * 3);
    // Indices of the distance operands of open `JumpIfZero`s.
    let mut backpatch = vec![];

    for instr in chunk {
        match *instr {
            ChangeValue { delta, offset } => {
                words.extend(&[Opcode::ChangeValue as Word, offset, delta.0 as Word]);
            }
            SetAbsolute { value, offset } => {
                words.extend(&[Opcode::SetAbsolute as Word, offset, value.0 as Word]);
            }
            InputByte { offset } => words.extend(&[Opcode::InputByte as Word, offset]),
            OutputByte { offset } => words.extend(&[Opcode::OutputByte as Word, offset]),
            LoopStart { offset } => {
                words.extend(&[Opcode::JumpIfZero as Word, offset, 0]);
                backpatch.push(words.len() - 1);
            }
            LoopEnd { offset } => {
                let start = backpatch.pop().ok_or(CompileError::UnmatchedLoopEnd)?;
                words.extend(&[Opcode::JumpIfNotZero as Word, offset, 0]);

                let end = words.len() - 1;
                let distance = (end - start) as Word;
                words[start] = distance;
                words[end] = distance;
            }
        }
    }

    if !backpatch.is_empty() {
        return Err(CompileError::UnbalancedDelimiters);
    }

    log::debug!("compiled {} instructions into {} words", chunk.len(), words.len());
    Ok(Bytecode { words })
}

impl fmt::Display for Bytecode {
    /// One instruction per line, with the address it starts at. Jumps
    /// show the address they land on when taken.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut address = 0;
        while address < self.words.len() {
            if address > 0 {
                writeln!(f)?;
            }

            let opcode = match Opcode::try_from(self.words[address]) {
                Ok(opcode) => opcode,
                Err(word) => return write!(f, "{:04} ??? {}", address, word),
            };
            let operands = match self.words.get(address + 1..address + opcode.width()) {
                Some(operands) => operands,
                None => return write!(f, "{:04} {} <truncated>", address, opcode.mnemonic()),
            };

            write!(f, "{:04} {:<4}", address, opcode.mnemonic())?;
            match (opcode, operands) {
                (Opcode::JumpIfZero, &[offset, distance]) => write!(
                    f,
                    " {:>4} {:>4}  -> {:04}",
                    offset,
                    distance,
                    address as Word + 3 + distance
                )?,
                (Opcode::JumpIfNotZero, &[offset, distance]) => write!(
                    f,
                    " {:>4} {:>4}  -> {:04}",
                    offset,
                    distance,
                    address as Word + 3 - distance
                )?,
                (_, operands) => {
                    for operand in operands {
                        write!(f, " {:>4}", operand)?;
                    }
                }
            }

            address += opcode.width();
        }
        Ok(())
    }
}

#[test]
fn compile_straight_line() {
    let bytecode = compile(&parse(b"+++.>,").unwrap()).unwrap();
    assert_eq!(bytecode.words(), &[3, 0, 3, 2, 0, 1, 1]);
}

#[test]
fn compile_set() {
    let bytecode = compile(&parse(b"+[-]--").unwrap()).unwrap();
    assert_eq!(bytecode.words(), &[4, 0, -2]);
}

#[test]
fn compile_backpatches_loop() {
    let bytecode = compile(&parse(b"+[>+<-]").unwrap()).unwrap();
    assert_eq!(
        bytecode.words(),
        &[3, 0, 1, 5, 0, 9, 3, 1, 1, 3, 0, -1, 6, 0, 9]
    );
}

#[test]
fn compile_nested_loops() {
    let bytecode = compile(&parse(b"+[>+[-<]>]").unwrap()).unwrap();
    assert_eq!(
        bytecode.words(),
        &[3, 0, 1, 5, 0, 15, 3, 1, 1, 5, 1, 6, 3, 0, -1, 6, -1, 6, 6, 1, 15]
    );
}

#[test]
fn compile_unbalanced_chunk() {
    use crate::instruction::Instruction;
    use std::num::Wrapping;

    let open = Chunk::new(vec![
        Instruction::ChangeValue {
            delta: Wrapping(1),
            offset: 0,
        },
        Instruction::LoopStart { offset: 0 },
    ]);
    assert_eq!(compile(&open), Err(CompileError::UnbalancedDelimiters));

    let close = Chunk::new(vec![Instruction::LoopEnd { offset: 0 }]);
    assert_eq!(compile(&close), Err(CompileError::UnmatchedLoopEnd));
}

#[test]
fn disassemble() {
    let bytecode = compile(&parse(b"+[>+<-].").unwrap()).unwrap();
    assert_eq!(
        bytecode.to_string(),
        "0000 add     0    1\n\
         0003 jz      0    9  -> 0015\n\
         0006 add     1    1\n\
         0009 add     0   -1\n\
         0012 jnz     0    9  -> 0006\n\
         0015 out     0"
    );
}

#[test]
fn opcode_encoding() {
    assert_eq!(Opcode::try_from(5), Ok(Opcode::JumpIfZero));
    assert_eq!(Opcode::try_from(0), Err(0));
    assert_eq!(Opcode::OutputByte.width(), 2);
    assert_eq!(Opcode::JumpIfNotZero as Word, 6);
}
