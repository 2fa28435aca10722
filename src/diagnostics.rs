//! Human-readable warnings and errors for the CLI.

use colored::Colorize;
use std::fmt;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// A line/column location in source code. Both start at 1.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }

    pub fn next_column(&mut self) {
        self.column += 1;
    }

    pub fn next_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub position: Option<Position>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Level {
    Warning,
    Error,
}

/// Render a diagnostic the way the CLI prints it:
///
/// ```text
/// error: this ] has no matching [
///  --> hello.bf:3:7
///   |
/// 3 | ++[>+<-]]
///   |         ^
/// ```
pub fn format_diagnostic(
    level: Level,
    message: &str,
    path: &str,
    source: &[u8],
    position: Option<Position>,
) -> String {
    let label = match level {
        Level::Warning => "warning".yellow().bold(),
        Level::Error => "error".red().bold(),
    };
    let mut result = format!("{}: {}", label, message.bold());

    let position = match position {
        Some(position) => position,
        None => {
            result.push_str(&format!("\n {} {}", "-->".blue().bold(), path));
            return result;
        }
    };

    result.push_str(&format!(
        "\n {} {}:{}",
        "-->".blue().bold(),
        path,
        position
    ));

    if let Some(line) = source_line(source, position.line) {
        let gutter = " ".repeat(position.line.to_string().len());
        let caret = format!("{}^", " ".repeat(position.column.saturating_sub(1)));
        let caret = match level {
            Level::Warning => caret.yellow().bold(),
            Level::Error => caret.red().bold(),
        };

        result.push_str(&format!("\n{} {}", gutter, "|".blue().bold()));
        result.push_str(&format!(
            "\n{} {} {}",
            position.line.to_string().blue().bold(),
            "|".blue().bold(),
            line
        ));
        result.push_str(&format!("\n{} {} {}", gutter, "|".blue().bold(), caret));
    }

    result
}

/// The 1-based `line` of `source`, without its terminator.
fn source_line(source: &[u8], line: usize) -> Option<String> {
    source
        .split(|&b| b == b'\n')
        .nth(line.checked_sub(1)?)
        .map(|bytes| {
            String::from_utf8_lossy(bytes)
                .trim_end_matches('\r')
                .to_owned()
        })
}

#[test]
fn position_advances_over_lines() {
    let mut pos = Position::default();
    pos.next_column();
    pos.next_column();
    assert_eq!(pos, Position::new(1, 3));

    pos.next_line();
    assert_eq!(pos, Position::new(2, 1));
}

#[test]
fn format_error_with_caret() {
    colored::control::set_override(false);

    let rendered = format_diagnostic(
        Level::Error,
        "this ] has no matching [",
        "demo.bf",
        b"+\n+]",
        Some(Position::new(2, 2)),
    );
    assert_eq!(
        rendered,
        "error: this ] has no matching [\n --> demo.bf:2:2\n  |\n2 | +]\n  |  ^"
    );
}

#[test]
fn format_warning_without_position() {
    colored::control::set_override(false);

    let rendered = format_diagnostic(Level::Warning, "nothing to do", "demo.bf", b"", None);
    assert_eq!(rendered, "warning: nothing to do\n --> demo.bf");
}

#[test]
fn source_line_out_of_range() {
    assert_eq!(source_line(b"+", 2), None);
    assert_eq!(source_line(b"+", 0), None);
    assert_eq!(source_line(b"a\r\nb", 1), Some("a".to_owned()));
}
