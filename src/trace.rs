//! Optional step-by-step tracing for [`crate::lex::Lexer`]/[`crate::parser::Parser`].
//!
//! Mirrors the teacher crate's `Log<T>` debug hook (`util/mod.rs`,
//! `util/logger.rs`): an ordered enum assigned once after construction via
//! `set_trace`, read back through a small order comparison to decide whether
//! a given call site's message clears the caller's requested verbosity.
//! Renamed `Trace` here to avoid colliding with application-level logging.

use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trace<T> {
    None,
    Default(T),
    Success(T),
    Result(T),
    Verbose(T),
}

impl<T> Trace<T> {
    pub fn order(&self) -> u8 {
        match self {
            Trace::None => 0,
            Trace::Default(_) => 1,
            Trace::Success(_) => 2,
            Trace::Result(_) => 3,
            Trace::Verbose(_) => 4,
        }
    }
}

impl<T: Display> Display for Trace<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trace::None => Ok(()),
            Trace::Default(s) | Trace::Success(s) | Trace::Result(s) | Trace::Verbose(s) => {
                write!(f, "{s}")
            }
        }
    }
}
