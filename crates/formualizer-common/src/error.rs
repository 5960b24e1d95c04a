//! Excel-style error representation. Errors that reach a cell are *values*, never
//! thrown signals — see `ExcelErrorKind` for the taxonomy this engine recognizes.

use std::fmt;

/// All recognised spreadsheet error codes.
///
/// Names are CamelCase (idiomatic Rust) while `Display` renders them the way a
/// spreadsheet host would show them to a user (`#DIV/0!`, `#REF!`, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExcelErrorKind {
    /// Formula text did not tokenize or parse.
    Parse,
    /// Reference dangles (a structural op removed its target).
    Ref,
    /// Unknown function or named range.
    Name,
    /// Argument type mismatch inside a function call.
    Value,
    /// Numeric domain error.
    Num,
    /// Division by zero.
    Div,
    /// Explicit "no value available".
    Na,
    /// Vertex sits on a detected dependency cycle.
    Cycle,
}

impl fmt::Display for ExcelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "#ERROR!",
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Value => "#VALUE!",
            Self::Num => "#NUM!",
            Self::Div => "#DIV/0!",
            Self::Na => "#N/A",
            Self::Cycle => "#CYCLE!",
        })
    }
}

/// A spreadsheet error value. Carries the canonical kind plus an optional
/// human-readable explanation for logs/diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExcelError {
    pub kind: ExcelErrorKind,
    pub message: Option<String>,
}

impl From<ExcelErrorKind> for ExcelError {
    fn from(kind: ExcelErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl ExcelError {
    pub fn new(kind: ExcelErrorKind) -> Self {
        kind.into()
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl fmt::Display for ExcelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExcelError {}

impl PartialEq<str> for ExcelError {
    fn eq(&self, other: &str) -> bool {
        self.kind.to_string() == other
    }
}
