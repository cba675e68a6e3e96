//! Error kinds and results used across the interpreter.
//!
//! Two layers exist, mirroring the split between what scripts see and what
//! embedders see:
//!
//! * [`RunError`] / [`RunResult`] flow through the evaluator. A thrown script
//!   value travels as [`Thrown`]; fatal faults (deadline, disposal) travel as
//!   dedicated variants that `try`/`catch` can never intercept.
//! * [`Exception`], [`ParseError`] and [`EngineError`] are the public shapes
//!   returned from [`crate::Engine`] entry points.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::{lexer::CodeLoc, value::Value};

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// Built-in error categories surfaced as the `name` property of error values.
///
/// The string representation matches the variant name exactly
/// (e.g. `TypeError` -> "TypeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ExcKind {
    /// Base error class, also used for host-raised errors.
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    /// Raised for syntax faults detected after parsing (e.g. an unsupported
    /// `yield*` position rejected by the lowering).
    SyntaxError,
    EvalError,
}

/// A lightweight exception carrying a kind and message, not yet materialized
/// as a script error object.
///
/// Most runtime faults are raised through this type and only turned into a
/// heap-allocated error object when a `catch` clause actually binds them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimpleError {
    pub kind: ExcKind,
    pub message: String,
}

impl SimpleError {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SimpleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A value in flight between `throw` and the `catch` that receives it.
#[derive(Debug, Clone)]
pub(crate) enum Thrown {
    /// A script value thrown by a `throw` statement or re-thrown by a handler.
    Value(Value),
    /// A runtime fault not yet materialized as an error object.
    Simple(SimpleError),
}

/// Internal error type for the evaluator and scheduler.
#[derive(Debug, Clone)]
pub(crate) enum RunError {
    /// A catchable script-level exception.
    Throw(Thrown),
    /// The configured execution deadline elapsed. Fatal to the current run;
    /// never observable from script.
    Timeout,
    /// The engine was disposed while work was still queued.
    Disposed,
}

impl RunError {
    pub fn throw(value: Value) -> Self {
        Self::Throw(Thrown::Value(value))
    }

    pub fn simple(kind: ExcKind, message: impl Into<String>) -> Self {
        Self::Throw(Thrown::Simple(SimpleError::new(kind, message)))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::simple(ExcKind::TypeError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::simple(ExcKind::RangeError, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::simple(ExcKind::ReferenceError, message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::simple(ExcKind::SyntaxError, message)
    }

    /// Whether this error can be intercepted by script `try`/`catch`.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Self::Throw(_))
    }
}

/// A parse failure with the source position where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// 1-based line of the offending token.
    pub line: u32,
    /// 1-based column of the offending token.
    pub column: u32,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self {
            message: message.into(),
            line: loc.line,
            column: loc.column,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError: {} (line {}, column {})", self.message, self.line, self.column)
    }
}

impl std::error::Error for ParseError {}

/// An embedder-visible runtime exception.
///
/// Carries the error classification, the rendered message, and the thrown
/// script value converted to a [`crate::HostValue`].
#[derive(Debug, Clone)]
pub struct Exception {
    /// The `name` of the error value ("TypeError", "Error", ...).
    pub name: String,
    /// The `message` of the error value, or the rendering of a non-error throw.
    pub message: String,
    /// The thrown value itself, converted for the host boundary.
    pub value: crate::HostValue,
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for Exception {}

/// Top-level error returned from [`crate::Engine`] operations.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// The source text failed to parse.
    Parse(ParseError),
    /// Script execution raised and nothing caught it.
    Script(Exception),
    /// The script-level execution timeout elapsed.
    Timeout,
    /// The engine has been disposed.
    Disposed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Script(e) => write!(f, "{e}"),
            Self::Timeout => write!(f, "execution timed out"),
            Self::Disposed => write!(f, "engine has been disposed"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exc_kind_names_round_trip() {
        assert_eq!(ExcKind::TypeError.to_string(), "TypeError");
        assert_eq!("RangeError".parse::<ExcKind>().unwrap(), ExcKind::RangeError);
    }

    #[test]
    fn parse_error_display_includes_position() {
        let err = ParseError::new("unexpected token", CodeLoc { line: 3, column: 7 });
        assert_eq!(err.to_string(), "SyntaxError: unexpected token (line 3, column 7)");
    }
}
