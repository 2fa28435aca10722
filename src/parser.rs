//! The parser drives a `ChunkBuilder` from the token stream and reports
//! unbalanced brackets with their source position.

use crate::chunk::Chunk;
use crate::diagnostics::{Position, Warning};
use crate::lexer::Lexer;
use crate::peephole::{BuildError, ChunkBuilder, LoopRewrite, OptimisationsFlags};
use crate::token::{Token, TokenKind};
use std::num::Wrapping;
use thiserror::Error;

#[cfg(test)]
use crate::instruction::Instruction::*;
#[cfg(test)]
use pretty_assertions::assert_eq;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseError {
    #[error("this ] has no matching [")]
    UnmatchedCloseBracket { position: Position },
    /// `position` is where the input ended, `opened` is the innermost `[`
    /// left open.
    #[error("reached end of input with the [ at {opened} still open")]
    UnclosedLoop { position: Position, opened: Position },
    #[error(transparent)]
    Builder(#[from] BuildError),
}

impl ParseError {
    pub fn position(&self) -> Option<Position> {
        match *self {
            ParseError::UnmatchedCloseBracket { position } => Some(position),
            ParseError::UnclosedLoop { position, .. } => Some(position),
            ParseError::Builder(_) => None,
        }
    }
}

pub struct Parser<I> {
    tokens: I,
    builder: ChunkBuilder,
    /// Positions of the `[` tokens that are still open.
    open_loops: Vec<Position>,
    warnings: Vec<Warning>,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: I) -> Self {
        Self::with_optimisations(tokens, OptimisationsFlags::all())
    }

    pub fn with_optimisations(tokens: I, flags: OptimisationsFlags) -> Self {
        Parser {
            tokens,
            builder: ChunkBuilder::with_optimisations(flags),
            open_loops: vec![],
            warnings: vec![],
        }
    }

    /// Consume every token and return the finished chunk, along with
    /// warnings about code the optimizer found to be dead.
    pub fn parse(mut self) -> Result<(Chunk, Vec<Warning>), ParseError> {
        loop {
            // A lexer always ends on EndOfInput, treat running dry the same.
            let token = match self.tokens.next() {
                Some(token) => token,
                None => break,
            };

            match token.kind {
                TokenKind::EndOfInput => {
                    if let Some(&opened) = self.open_loops.last() {
                        return Err(ParseError::UnclosedLoop {
                            position: token.pos,
                            opened,
                        });
                    }
                    break;
                }
                TokenKind::Inc => self.builder.change_value(Wrapping(1))?,
                TokenKind::Dec => self.builder.change_value(Wrapping(-1))?,
                TokenKind::PointerDec => self.builder.change_pointer(-1)?,
                TokenKind::PointerInc => self.builder.change_pointer(1)?,
                TokenKind::InputByte => self.builder.input_byte()?,
                TokenKind::OutputByte => self.builder.output_byte()?,
                TokenKind::LoopStart => {
                    self.open_loops.push(token.pos);
                    self.builder.start_loop()?;
                }
                TokenKind::LoopEnd => {
                    let opened = self
                        .open_loops
                        .pop()
                        .ok_or(ParseError::UnmatchedCloseBracket {
                            position: token.pos,
                        })?;

                    if self.builder.end_loop()? == LoopRewrite::Removed {
                        self.warnings.push(Warning {
                            message: "this loop is never executed".to_owned(),
                            position: Some(opened),
                        });
                    }
                }
            }
        }

        if let Some(&opened) = self.open_loops.last() {
            return Err(ParseError::UnclosedLoop {
                position: opened,
                opened,
            });
        }

        let chunk = self.builder.finalize()?;
        log::debug!(
            "parsed {} instructions ({} warnings)",
            chunk.len(),
            self.warnings.len()
        );
        Ok((chunk, self.warnings))
    }
}

/// Given a string of BF source code, parse and return the optimized
/// chunk. If parsing fails, return a ParseError describing what went
/// wrong.
pub fn parse(source: &[u8]) -> Result<Chunk, ParseError> {
    parse_with(source, OptimisationsFlags::all()).map(|(chunk, _)| chunk)
}

pub fn parse_with(
    source: &[u8],
    flags: OptimisationsFlags,
) -> Result<(Chunk, Vec<Warning>), ParseError> {
    Parser::with_optimisations(Lexer::new(source), flags).parse()
}

#[test]
fn parse_increment() {
    assert_eq!(
        parse(b"+++").unwrap().instructions(),
        [ChangeValue {
            delta: Wrapping(3),
            offset: 0
        }]
    );
}

#[test]
fn parse_pointer_moves_cancel() {
    let mut builder = ChunkBuilder::new();
    builder.change_pointer(1).unwrap();
    builder.change_pointer(-1).unwrap();
    assert_eq!(builder.pending_offset(), 0);
    assert!(builder.instructions().is_empty());

    assert!(parse(b"><").unwrap().is_empty());
}

#[test]
fn parse_offsets() {
    assert_eq!(
        parse(b">>+<.").unwrap().instructions(),
        [
            ChangeValue {
                delta: Wrapping(1),
                offset: 2
            },
            OutputByte { offset: 1 }
        ]
    );
}

#[test]
fn parse_loop() {
    assert_eq!(
        parse(b"+[>+<-]").unwrap().instructions(),
        [
            ChangeValue {
                delta: Wrapping(1),
                offset: 0
            },
            LoopStart { offset: 0 },
            ChangeValue {
                delta: Wrapping(1),
                offset: 1
            },
            ChangeValue {
                delta: Wrapping(-1),
                offset: 0
            },
            LoopEnd { offset: 0 },
        ]
    );
}

#[test]
fn parse_comment() {
    assert!(parse(b"foo! ").unwrap().is_empty());
}

#[test]
fn parse_unclosed_loop() {
    assert_eq!(
        parse(b"["),
        Err(ParseError::UnclosedLoop {
            position: Position::new(1, 2),
            opened: Position::new(1, 1),
        })
    );
}

#[test]
fn parse_unclosed_reports_innermost() {
    assert_eq!(
        parse(b"+[\n[[]"),
        Err(ParseError::UnclosedLoop {
            position: Position::new(2, 4),
            opened: Position::new(2, 1),
        })
    );
}

#[test]
fn parse_unmatched_close() {
    assert_eq!(
        parse(b"]"),
        Err(ParseError::UnmatchedCloseBracket {
            position: Position::new(1, 1)
        })
    );
    assert_eq!(
        parse(b"+[]\n  ]["),
        Err(ParseError::UnmatchedCloseBracket {
            position: Position::new(2, 3)
        })
    );
}

#[test]
fn parse_unbalanced_loop() {
    assert!(parse(b"[").is_err());
    assert!(parse(b"]").is_err());
    assert!(parse(b"][").is_err());
    assert!(parse(b"[][").is_err());
}

#[test]
fn parse_reports_dead_loops() {
    let (chunk, warnings) = parse_with(b"[.]+", OptimisationsFlags::all()).unwrap();
    assert_eq!(
        chunk.instructions(),
        [ChangeValue {
            delta: Wrapping(1),
            offset: 0
        }]
    );
    assert_eq!(
        warnings,
        vec![Warning {
            message: "this loop is never executed".to_owned(),
            position: Some(Position::new(1, 1)),
        }]
    );
}

#[test]
fn parse_without_optimisations() {
    let (chunk, warnings) = parse_with(b"[-]", OptimisationsFlags::empty()).unwrap();
    assert_eq!(
        chunk.instructions(),
        [
            LoopStart { offset: 0 },
            ChangeValue {
                delta: Wrapping(-1),
                offset: 0
            },
            LoopEnd { offset: 0 },
        ]
    );
    assert!(warnings.is_empty());
}

#[test]
fn parse_error_positions() {
    assert_eq!(
        parse(b"]").unwrap_err().position(),
        Some(Position::new(1, 1))
    );
    assert_eq!(
        ParseError::Builder(BuildError::AlreadyFinalized).position(),
        None
    );
}
