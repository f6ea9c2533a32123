//! The two-stage lexer (`spec.md` §4.1, §4.9): a byte-at-a-time scanner
//! that consumes the raw input buffer once and emits a stream of
//! [`LexEvent`]s, never re-reading a byte it has already classified.

use crate::char_table::{ByteClass, CHAR_TABLE};
use crate::error::{Checkpoint, ErrorKind, ParseError};
use crate::escape;
use crate::trace::Trace;
use once_cell::unsync::OnceCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubState {
    SkipWhitespace,
    GetToken,
    SkipComment,
    SkipMlComment,
}

/// A lexed token's payload: an unquoted token borrows straight from the
/// input buffer, while a quoted token owns a freshly allocated, already
/// unescaped buffer (`spec.md`'s `Token`).
#[derive(Debug, Clone)]
pub enum TokenData<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl<'a> TokenData<'a> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TokenData::Borrowed(b) => b,
            TokenData::Owned(v) => v,
        }
    }
    /// Converts the token into an owned dictionary string: takes ownership
    /// of a quoted allocation, or copies an unquoted slice.
    pub fn into_owned(self) -> Vec<u8> {
        match self {
            TokenData::Borrowed(b) => b.to_vec(),
            TokenData::Owned(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LexToken<'a> {
    pub data: TokenData<'a>,
    pub quoted: bool,
}

#[derive(Debug, Clone)]
pub enum LexEvent<'a> {
    Token(LexToken<'a>),
    EndVal,
    BlockBegin,
    BlockEnd,
    ArrayBegin,
    ArrayEnd,
    Eof,
}

pub struct Lexer<'a> {
    buf: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    saved: Option<Checkpoint>,
    prev_byte: u8,
    trace: OnceCell<Trace<&'static str>>,
}

impl<'a> Lexer<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            line: 1,
            line_start: 0,
            saved: None,
            prev_byte: 0,
            trace: OnceCell::new(),
        }
    }

    /// Opts into step-by-step tracing of emitted lex events. May be set at
    /// most once; a second call is rejected, matching the teacher's
    /// `set_log`/`assign_debugger` contract.
    pub fn set_trace(&self, trace: Trace<&'static str>) -> Result<(), String> {
        self.trace
            .set(trace)
            .map_err(|t| format!("trace {t} is already set for this lexer"))
    }

    fn trace_event(&self, event: &LexEvent<'_>) {
        let Some(trace) = self.trace.get() else { return };
        if trace.order() < Trace::Success(()).order() {
            return;
        }
        let desc = match event {
            LexEvent::Token(t) => format!("Token({:?}, quoted={})", String::from_utf8_lossy(t.data.as_bytes()), t.quoted),
            LexEvent::EndVal => "EndVal".to_string(),
            LexEvent::BlockBegin => "BlockBegin".to_string(),
            LexEvent::BlockEnd => "BlockEnd".to_string(),
            LexEvent::ArrayBegin => "ArrayBegin".to_string(),
            LexEvent::ArrayEnd => "ArrayEnd".to_string(),
            LexEvent::Eof => "Eof".to_string(),
        };
        println!("[{trace}; LexEvent]: {desc} at {}:{}", self.line, self.column());
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            line: self.line,
            column: self.column(),
        }
    }

    fn current_line_text(&self) -> Vec<u8> {
        let end = self.buf[self.line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| self.line_start + i)
            .unwrap_or(self.buf.len());
        self.buf[self.line_start..end].to_vec()
    }

    /// Builds an error at the lexer's current position. `pub(crate)` so the
    /// parser can report its own arity/level errors at the same real
    /// position instead of a stub one (`spec.md` §4.1, §6.4).
    pub(crate) fn error(&self, kind: ErrorKind) -> ParseError {
        let byte = self.buf.get(self.pos).copied();
        ParseError::new(kind, self.line, self.column(), self.current_line_text(), byte)
    }

    /// An error for an unterminated far-delimiter construct (quoted string,
    /// multi-line comment): reports the opening position, per `spec.md`
    /// §4.1's checkpoint note, rather than the point of exhaustion.
    fn error_at_open(&self, kind: ErrorKind) -> ParseError {
        let saved = self.saved.expect("error_at_open called without a saved checkpoint");
        let byte = self.buf.get(self.pos).copied();
        ParseError::new(kind, saved.line, saved.column, self.current_line_text(), byte)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.pos + offset).copied()
    }

    fn byte(&self) -> Option<u8> {
        self.peek(0)
    }

    fn advance(&mut self) {
        if let Some(b) = self.byte() {
            self.prev_byte = b;
            if b == b'\n' {
                self.line += 1;
                self.pos += 1;
                self.line_start = self.pos;
                return;
            }
            self.pos += 1;
        }
    }

    /// Advances past a `\r\n` pair as a single newline unit, or a lone `\n`.
    fn advance_newline(&mut self) {
        if self.byte() == Some(b'\r') && self.peek(1) == Some(b'\n') {
            self.prev_byte = b'\n';
            self.pos += 2;
            self.line += 1;
            self.line_start = self.pos;
        } else {
            self.advance();
        }
    }

    fn at_token_start(&self, class: ByteClass) -> bool {
        class.contains(ByteClass::TOK) || class.contains(ByteClass::EXT)
    }

    /// Returns the next lex event, or an error. Never re-reads bytes already
    /// consumed by a prior call.
    pub fn next_event(&mut self) -> Result<LexEvent<'a>, ParseError> {
        let event = self.next_event_inner()?;
        self.trace_event(&event);
        Ok(event)
    }

    fn next_event_inner(&mut self) -> Result<LexEvent<'a>, ParseError> {
        let mut state = SubState::SkipWhitespace;
        loop {
            let Some(b) = self.byte() else {
                return Ok(LexEvent::Eof);
            };
            if b == 0 {
                return Ok(LexEvent::Eof);
            }
            let class = CHAR_TABLE.classify(b);

            match state {
                SubState::SkipWhitespace => {
                    if class.contains(ByteClass::NLN) {
                        self.advance_newline();
                        continue;
                    }
                    if class.contains(ByteClass::SPC) {
                        self.advance();
                        continue;
                    }
                    if b == b'#' {
                        self.saved = Some(self.checkpoint());
                        state = SubState::SkipComment;
                        self.advance();
                        continue;
                    }
                    if b == b'/' && self.peek(1) == Some(b'/') {
                        self.saved = Some(self.checkpoint());
                        state = SubState::SkipComment;
                        self.advance();
                        self.advance();
                        continue;
                    }
                    if b == b'/' && self.peek(1) == Some(b'*') {
                        self.saved = Some(self.checkpoint());
                        state = SubState::SkipMlComment;
                        self.advance();
                        self.advance();
                        continue;
                    }
                    if class.contains(ByteClass::QUO) {
                        return self.scan_quoted(b);
                    }
                    if class.contains(ByteClass::CTL) {
                        self.advance();
                        return Ok(Self::ctl_event(b));
                    }
                    if self.at_token_start(class) {
                        state = SubState::GetToken;
                        continue;
                    }
                    if class.contains(ByteClass::ILL) {
                        return Err(self.error(ErrorKind::Unexpected));
                    }
                    self.advance();
                }
                SubState::GetToken => {
                    return Ok(LexEvent::Token(self.scan_token()));
                }
                SubState::SkipComment => {
                    if class.contains(ByteClass::NLN) || b == 0 {
                        self.saved = None;
                        state = SubState::SkipWhitespace;
                        continue;
                    }
                    self.advance();
                }
                SubState::SkipMlComment => {
                    if b == b'*' && self.peek(1) == Some(b'/') {
                        self.advance();
                        self.advance();
                        self.saved = None;
                        state = SubState::SkipWhitespace;
                        continue;
                    }
                    if class.contains(ByteClass::NLN) {
                        self.advance_newline();
                        continue;
                    }
                    self.advance();
                }
            }
        }
    }

    fn ctl_event(b: u8) -> LexEvent<'static> {
        use crate::char_table::*;
        match b {
            BS_ENDVAL | BS_ENDVAL_ALT => LexEvent::EndVal,
            BS_STARTBLOCK => LexEvent::BlockBegin,
            BS_ENDBLOCK => LexEvent::BlockEnd,
            BS_STARTARRAY => LexEvent::ArrayBegin,
            BS_ENDARRAY => LexEvent::ArrayEnd,
            _ => unreachable!("non-control byte passed to ctl_event"),
        }
    }

    fn scan_token(&mut self) -> LexToken<'a> {
        let start = self.pos;
        loop {
            match self.byte() {
                Some(b) if b != 0 => {
                    let class = CHAR_TABLE.classify(b);
                    if self.at_token_start(class) {
                        self.advance();
                        continue;
                    }
                    break;
                }
                _ => break,
            }
        }
        LexToken {
            data: TokenData::Borrowed(&self.buf[start..self.pos]),
            quoted: false,
        }
    }

    fn scan_quoted(&mut self, quote: u8) -> Result<LexEvent<'a>, ParseError> {
        self.saved = Some(self.checkpoint());
        self.advance(); // consume opening quote
        let mut out = Vec::new();

        loop {
            let Some(b) = self.byte() else {
                return Err(self.error_at_open(ErrorKind::Eof).with_detail("unterminated quoted string"));
            };
            if b == 0 {
                return Err(self.error_at_open(ErrorKind::Eof).with_detail("unterminated quoted string"));
            }
            if b == quote {
                // Possible close, or the start of a multi-line continuation:
                // close-quote, escape byte, whitespace/newlines, same quote.
                if self.peek(1) == Some(crate::char_table::ESCAPE_BYTE) {
                    let mut probe = self.pos + 2;
                    while let Some(pb) = self.buf.get(probe).copied() {
                        let pc = CHAR_TABLE.classify(pb);
                        if pc.contains(ByteClass::SPC) || pc.contains(ByteClass::NLN) {
                            probe += 1;
                            continue;
                        }
                        break;
                    }
                    if self.buf.get(probe).copied() == Some(quote) {
                        // Resume: skip to just after the resuming quote.
                        while self.pos < probe {
                            if CHAR_TABLE.classify(self.buf[self.pos]).contains(ByteClass::NLN) {
                                self.advance_newline();
                            } else {
                                self.advance();
                            }
                        }
                        self.advance(); // consume resuming quote
                        continue;
                    } else {
                        return Err(self
                            .error(ErrorKind::Quoted)
                            .with_detail("invalid multi-line continuation"));
                    }
                }
                self.advance();
                self.saved = None;
                return Ok(LexEvent::Token(LexToken {
                    data: TokenData::Owned(out),
                    quoted: true,
                }));
            }
            if CHAR_TABLE.classify(b).contains(ByteClass::NLN) {
                return Err(self.error_at_open(ErrorKind::Quoted).with_detail("unterminated quoted string"));
            }
            if b == crate::char_table::ESCAPE_BYTE {
                match self.peek(1) {
                    Some(next) => {
                        match escape::unescape_byte(next) {
                            Some(resolved) => out.push(resolved),
                            None => out.push(next),
                        }
                        self.advance();
                        self.advance();
                    }
                    None => {
                        return Err(self
                            .error_at_open(ErrorKind::Eof)
                            .with_detail("unterminated quoted string"))
                    }
                }
                continue;
            }
            out.push(b);
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(src: &str) -> Vec<String> {
        let mut lexer = Lexer::new(src.as_bytes());
        let mut out = Vec::new();
        loop {
            match lexer.next_event().unwrap() {
                LexEvent::Token(t) => out.push(format!(
                    "TOKEN({:?}, {})",
                    String::from_utf8_lossy(t.data.as_bytes()),
                    t.quoted
                )),
                LexEvent::EndVal => out.push("ENDVAL".into()),
                LexEvent::BlockBegin => out.push("BLOCKBEGIN".into()),
                LexEvent::BlockEnd => out.push("BLOCKEND".into()),
                LexEvent::ArrayBegin => out.push("ARRAYBEGIN".into()),
                LexEvent::ArrayEnd => out.push("ARRAYEND".into()),
                LexEvent::Eof => {
                    out.push("EOF".into());
                    break;
                }
            }
        }
        out
    }

    #[test]
    fn simple_statement() {
        assert_eq!(
            events("a b;"),
            vec!["TOKEN(\"a\", false)", "TOKEN(\"b\", false)", "ENDVAL", "EOF"]
        );
    }

    #[test]
    fn block_nesting() {
        assert_eq!(
            events("a { b; }"),
            vec![
                "TOKEN(\"a\", false)",
                "BLOCKBEGIN",
                "TOKEN(\"b\", false)",
                "ENDVAL",
                "BLOCKEND",
                "EOF"
            ]
        );
    }

    #[test]
    fn line_comment_skipped() {
        assert_eq!(events("a; # comment\nb;"), {
            let mut v = vec!["TOKEN(\"a\", false)".to_string(), "ENDVAL".into()];
            v.push("TOKEN(\"b\", false)".into());
            v.push("ENDVAL".into());
            v.push("EOF".into());
            v
        });
    }

    #[test]
    fn quoted_token_unescapes() {
        let mut lexer = Lexer::new(br#"s "hel\nlo";"#);
        lexer.next_event().unwrap();
        let tok = lexer.next_event().unwrap();
        match tok {
            LexEvent::Token(t) => {
                assert!(t.quoted);
                assert_eq!(t.data.as_bytes(), b"hel\nlo");
            }
            _ => panic!("expected token"),
        }
    }

    #[test]
    fn unterminated_quote_reports_eof_error() {
        let mut lexer = Lexer::new(br#""foo"#);
        let err = lexer.next_event().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Eof);
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 1);
    }

    #[test]
    fn multiline_continuation_resumes_string() {
        let mut lexer = Lexer::new(b"\"foo\"\\\n\"bar\"");
        let tok = lexer.next_event().unwrap();
        match tok {
            LexEvent::Token(t) => assert_eq!(t.data.as_bytes(), b"foobar"),
            _ => panic!("expected token"),
        }
    }

    #[test]
    fn array_brackets() {
        assert_eq!(
            events("[1 2]"),
            vec![
                "ARRAYBEGIN",
                "TOKEN(\"1\", false)",
                "TOKEN(\"2\", false)",
                "ARRAYEND",
                "EOF"
            ]
        );
    }
}
