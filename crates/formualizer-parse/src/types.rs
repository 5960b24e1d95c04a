use std::error::Error;
use std::fmt;

/// Grammar variant the tokenizer/parser accept. Only the argument separator
/// differs in practice; kept as its own type so callers don't thread a bare
/// `char` through the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaDialect {
    /// `,` separates function arguments, `.` is the decimal point.
    Us,
    /// `;` separates function arguments (needed because `,` is the decimal
    /// point in this locale family).
    Intl,
}

impl FormulaDialect {
    pub fn arg_separator(self) -> char {
        match self {
            FormulaDialect::Us => ',',
            FormulaDialect::Intl => ';',
        }
    }
}

impl Default for FormulaDialect {
    fn default() -> Self {
        FormulaDialect::Us
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsingError {
    InvalidReference(String),
    UnexpectedToken { found: String, pos: usize },
    UnexpectedEnd,
    TooManyTokens,
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsingError::InvalidReference(r) => write!(f, "invalid reference: {r}"),
            ParsingError::UnexpectedToken { found, pos } => {
                write!(f, "unexpected token '{found}' at {pos}")
            }
            ParsingError::UnexpectedEnd => write!(f, "unexpected end of formula"),
            ParsingError::TooManyTokens => write!(f, "formula exceeds the maximum token count"),
        }
    }
}

impl Error for ParsingError {}
