//! Parses `A1` / `A1:B2` style text addresses, the form every public
//! `Engine` entry point accepts, into the 0-indexed coordinates the graph
//! works with internally.

use formualizer_common::{Coord, RangeRef, RelativeCoord, SheetId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("'{0}' is not a valid cell address")]
    Malformed(String),
}

/// Splits `A1` into its column-letters and row-digits runs.
fn split_cell(text: &str) -> Option<(&str, &str)> {
    let split_at = text.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = text.split_at(split_at);
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    if !letters.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    Some((letters, digits))
}

pub fn parse_cell(text: &str) -> Result<Coord, AddressError> {
    let (letters, digits) = split_cell(text).ok_or_else(|| AddressError::Malformed(text.to_string()))?;
    let col = RelativeCoord::letters_to_col(letters).ok_or_else(|| AddressError::Malformed(text.to_string()))?;
    let row: u32 = digits
        .parse::<u32>()
        .map_err(|_| AddressError::Malformed(text.to_string()))?;
    if row == 0 {
        return Err(AddressError::Malformed(text.to_string()));
    }
    Ok(Coord::new(row - 1, col))
}

/// Parses `A1` or `A1:B2` into a (possibly single-cell) range on `sheet`.
pub fn parse_range(sheet: SheetId, text: &str) -> Result<RangeRef, AddressError> {
    match text.split_once(':') {
        Some((a, b)) => {
            let start = parse_cell(a)?;
            let end = parse_cell(b)?;
            Ok(RangeRef::new(sheet, start, end))
        }
        None => {
            let cell = parse_cell(text)?;
            Ok(RangeRef::new(sheet, cell, cell))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a1_to_zero_indexed_coord() {
        let c = parse_cell("A1").unwrap();
        assert_eq!((c.row(), c.col()), (0, 0));
    }

    #[test]
    fn parses_multi_letter_columns() {
        let c = parse_cell("AA10").unwrap();
        assert_eq!((c.row(), c.col()), (9, 26));
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(parse_cell("1A").is_err());
        assert!(parse_cell("A0").is_err());
        assert!(parse_cell("").is_err());
    }

    #[test]
    fn parses_a_range() {
        let r = parse_range(0, "A1:B2").unwrap();
        assert_eq!((r.start.row(), r.start.col()), (0, 0));
        assert_eq!((r.end.row(), r.end.col()), (1, 1));
    }
}
