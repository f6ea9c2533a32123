//! Parse/lex error surface (`spec.md` §7).
//!
//! Errors are returned, never thrown or recovered internally. A partial
//! tree built up to the point of failure remains well-formed; the caller is
//! free to keep using the `Dictionary` that `parse` handed back.

use std::fmt::{Display, Formatter};

/// Error kinds from `spec.md` §7. Carried as a code, not a type, so a single
/// `ParseError` struct can describe all of them uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Success: no error occurred. Only used inside `ParseState`, never
    /// constructed as part of a returned `Err`.
    None,
    /// Unexpected end-of-buffer. Meaning depends on the scan sub-state the
    /// lexer was in when it ran out of bytes.
    Eof,
    /// An ILL-class byte was encountered outside a quoted string.
    Unexpected,
    /// A structural context required a name/identifier that was absent.
    ExpId,
    /// An identifier appeared where none was permitted.
    UnexpId,
    /// More than `Parser::TOKEN_CACHE_SIZE` identifiers accumulated without
    /// a terminator in a non-array context.
    Tokens,
    /// Bracket imbalance at EOF.
    Level,
    /// A structural mistake: `}`/`]` in a position that cannot close
    /// anything, or `]` while not inside an array.
    Block,
    /// Newline inside a quoted string, or an invalid multi-line continuation.
    Quoted,
    /// Fallthrough internal error.
    Generic,
}

impl ErrorKind {
    fn message(&self) -> &'static str {
        match self {
            ErrorKind::None => "no error",
            ErrorKind::Eof => "unexpected end of file",
            ErrorKind::Unexpected => "unexpected character",
            ErrorKind::ExpId => "expected an identifier",
            ErrorKind::UnexpId => "unexpected identifier",
            ErrorKind::Tokens => "too many consecutive identifiers",
            ErrorKind::Level => "unbalanced block or array",
            ErrorKind::Block => "misplaced block or array terminator",
            ErrorKind::Quoted => "invalid quoted string",
            ErrorKind::Generic => "parse error",
        }
    }
}

/// A saved checkpoint for a far-delimiter error: the position a long-lived
/// construct (a quoted string, a multi-line comment) was opened at, so the
/// error can point there rather than at the point of exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub line: usize,
    pub column: usize,
    /// The current source line, for rendering a caret window.
    pub line_text: Vec<u8>,
    /// The byte at the error point, if any (absent at true EOF).
    pub error_byte: Option<u8>,
    /// Saved opening position for far-delimiter errors (unterminated quoted
    /// string, unterminated multi-line comment).
    pub saved: Option<Checkpoint>,
    pub detail: String,
}

impl ParseError {
    pub fn new(
        kind: ErrorKind,
        line: usize,
        column: usize,
        line_text: Vec<u8>,
        error_byte: Option<u8>,
    ) -> Self {
        let detail = kind.message().to_string();
        Self {
            kind,
            line,
            column,
            line_text,
            error_byte,
            saved: None,
            detail,
        }
    }

    pub fn with_saved(mut self, saved: Checkpoint) -> Self {
        self.saved = Some(saved);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Renders a human-readable diagnostic with an 80-column context window
    /// and a caret at `min(column, 40)`, per `spec.md` §6.4.
    pub fn print_error(&self) -> String {
        const WIDTH: usize = 80;
        let caret_col = self.column.min(40);
        let line = String::from_utf8_lossy(&self.line_text);
        let window: String = line.chars().take(WIDTH).collect();
        let mut out = format!(
            "SyntaxError: {} at line {}, column {}\n{}\n",
            self.detail, self.line, self.column, window
        );
        for _ in 0..caret_col.saturating_sub(1) {
            out.push(' ');
        }
        out.push('^');
        if let Some(saved) = self.saved {
            out.push_str(&format!(
                "\n(opened at line {}, column {})",
                saved.line, saved.column
            ));
        }
        out
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.detail, self.line, self.column
        )
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_caret_at_column() {
        let err = ParseError::new(ErrorKind::Unexpected, 1, 5, b"abc!def".to_vec(), Some(b'!'));
        let rendered = err.print_error();
        assert!(rendered.contains("column 5"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn carries_saved_checkpoint() {
        let err = ParseError::new(ErrorKind::Eof, 3, 1, Vec::new(), None)
            .with_saved(Checkpoint { line: 1, column: 4 });
        assert_eq!(err.saved, Some(Checkpoint { line: 1, column: 4 }));
    }
}
