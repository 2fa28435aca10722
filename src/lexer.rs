//! The lexer turns raw source bytes into the eight Brainfuck tokens,
//! tracking line and column as it goes. Any other byte is a comment.

use crate::diagnostics::Position;
use crate::token::{Token, TokenKind};

#[cfg(test)]
use pretty_assertions::assert_eq;

/// A lazy token stream over `source`. Yields exactly one
/// `TokenKind::EndOfInput` token, then nothing.
pub struct Lexer<'a> {
    source: &'a [u8],
    offset: usize,
    pos: Position,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Lexer {
            source,
            offset: 0,
            pos: Position::default(),
            finished: false,
        }
    }

    fn advance(&mut self, byte: u8) {
        self.offset += 1;
        if byte == b'\n' {
            self.pos.next_line();
        } else {
            self.pos.next_column();
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }

        while let Some(&byte) = self.source.get(self.offset) {
            let pos = self.pos;
            self.advance(byte);

            if let Some(kind) = TokenKind::from_byte(byte) {
                log::trace!("token {} at {}", kind, pos);
                return Some(Token { kind, pos });
            }
        }

        self.finished = true;
        Some(Token {
            kind: TokenKind::EndOfInput,
            pos: self.pos,
        })
    }
}

#[cfg(test)]
fn kinds(source: &str) -> Vec<TokenKind> {
    Lexer::new(source.as_bytes()).map(|t| t.kind).collect()
}

#[test]
fn lex_all_symbols() {
    use TokenKind::*;
    assert_eq!(
        kinds("+-<>,.[]"),
        vec![
            Inc, Dec, PointerDec, PointerInc, InputByte, OutputByte, LoopStart, LoopEnd,
            EndOfInput
        ]
    );
}

#[test]
fn lex_empty() {
    let tokens: Vec<_> = Lexer::new(b"").collect();
    assert_eq!(
        tokens,
        vec![Token {
            kind: TokenKind::EndOfInput,
            pos: Position::new(1, 1),
        }]
    );
}

#[test]
fn lex_skips_comments() {
    assert_eq!(
        kinds("hello + world!"),
        vec![TokenKind::Inc, TokenKind::EndOfInput]
    );
}

#[test]
fn lex_tracks_positions() {
    let tokens: Vec<_> = Lexer::new(b"a+\n  ]\n").collect();
    assert_eq!(
        tokens,
        vec![
            Token {
                kind: TokenKind::Inc,
                pos: Position::new(1, 2),
            },
            Token {
                kind: TokenKind::LoopEnd,
                pos: Position::new(2, 3),
            },
            Token {
                kind: TokenKind::EndOfInput,
                pos: Position::new(3, 1),
            },
        ]
    );
}

#[test]
fn lex_end_of_input_once() {
    let mut lexer = Lexer::new(b"[");
    assert_eq!(lexer.next().map(|t| t.kind), Some(TokenKind::LoopStart));
    let eof = lexer.next().unwrap();
    assert_eq!(eof.kind, TokenKind::EndOfInput);
    assert_eq!(eof.pos, Position::new(1, 2));
    assert_eq!(lexer.next(), None);
    assert_eq!(lexer.next(), None);
}
