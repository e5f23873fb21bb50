//! Submission language front end.
//!
//! Submissions are written in a small, safely interpretable subset of
//! Python 3. This module owns its grammar: the lexer turns source text into
//! indentation-aware tokens, the parser builds the [`ast`] consumed by the
//! static vettor and the interpreter.

pub mod ast;
pub mod lexer;
pub mod parser;

use thiserror::Error;

pub use ast::Module;
pub use parser::parse_module;

/// Syntax error with the 1-based line it was detected on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line})")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;
