use crate::diagnostics::Position;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    EndOfInput,
    Inc,
    Dec,
    PointerDec,
    PointerInc,
    InputByte,
    OutputByte,
    LoopStart,
    LoopEnd,
}

impl TokenKind {
    /// Map a source byte to its token. Bytes outside the instruction set
    /// are comments and have no token.
    pub fn from_byte(byte: u8) -> Option<TokenKind> {
        match byte {
            b'+' => Some(TokenKind::Inc),
            b'-' => Some(TokenKind::Dec),
            b'<' => Some(TokenKind::PointerDec),
            b'>' => Some(TokenKind::PointerInc),
            b',' => Some(TokenKind::InputByte),
            b'.' => Some(TokenKind::OutputByte),
            b'[' => Some(TokenKind::LoopStart),
            b']' => Some(TokenKind::LoopEnd),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            TokenKind::EndOfInput => "end of input",
            TokenKind::Inc => "+",
            TokenKind::Dec => "-",
            TokenKind::PointerDec => "<",
            TokenKind::PointerInc => ">",
            TokenKind::InputByte => ",",
            TokenKind::OutputByte => ".",
            TokenKind::LoopStart => "[",
            TokenKind::LoopEnd => "]",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

#[test]
fn token_kind_displays_its_symbol() {
    let symbols: String = b"+-<>,.[]"
        .iter()
        .filter_map(|&byte| TokenKind::from_byte(byte))
        .map(|kind| kind.to_string())
        .collect();
    assert_eq!(symbols, "+-<>,.[]");
    assert_eq!(TokenKind::EndOfInput.to_string(), "end of input");
    assert_eq!(TokenKind::from_byte(b'a'), None);
}
