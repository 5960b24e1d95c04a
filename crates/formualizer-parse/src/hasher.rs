//! Template hashing: two formulas that are identical except for their
//! *relative* cell/range operands must hash the same, so the engine can
//! share one parsed AST across every cell a formula was filled down or
//! across into. Absolute operands (`$A$1`) are not relocatable and are
//! hashed by their literal coordinate; relative operands are hashed as an
//! opaque placeholder instead of their (row, col).

use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHasher;

use crate::parser::{parse_reference_text, ASTNode, ASTNodeType, ReferenceType};

// Discriminant tags, one per node/reference shape, hashed ahead of each
// node's payload so e.g. `Literal(Number(1))` and `Reference` to a cell
// whose template-relative coordinate happens to collide never hash equal.
const TAG_LITERAL_NUMBER: u8 = 0;
const TAG_LITERAL_TEXT: u8 = 1;
const TAG_LITERAL_BOOL: u8 = 2;
const TAG_LITERAL_ERROR: u8 = 3;
const TAG_LITERAL_EMPTY: u8 = 4;
const TAG_REF_CELL: u8 = 5;
const TAG_REF_RANGE: u8 = 6;
const TAG_REF_NAME: u8 = 7;
const TAG_UNARY: u8 = 8;
const TAG_BINARY: u8 = 9;
const TAG_CALL: u8 = 10;
const TAG_EMPTY_ARG: u8 = 11;
const TAG_RELATIVE_PLACEHOLDER: u8 = 0xAA;

/// Computes the template hash of an AST: relative reference coordinates are
/// erased, everything else (operators, literals, function names, sheet
/// qualifiers, absolute coordinates) is hashed verbatim.
pub fn template_hash(node: &ASTNode) -> u64 {
    let mut hasher = FxHasher::default();
    hash_node(node, &mut hasher);
    hasher.finish()
}

fn hash_node<H: Hasher>(node: &ASTNode, state: &mut H) {
    match &node.node_type {
        ASTNodeType::Literal(formualizer_common::LiteralValue::Number(n)) => {
            state.write_u8(TAG_LITERAL_NUMBER);
            n.to_bits().hash(state);
        }
        ASTNodeType::Literal(formualizer_common::LiteralValue::Text(s)) => {
            state.write_u8(TAG_LITERAL_TEXT);
            s.hash(state);
        }
        ASTNodeType::Literal(formualizer_common::LiteralValue::Boolean(b)) => {
            state.write_u8(TAG_LITERAL_BOOL);
            b.hash(state);
        }
        ASTNodeType::Literal(formualizer_common::LiteralValue::Error(e)) => {
            state.write_u8(TAG_LITERAL_ERROR);
            e.hash(state);
        }
        ASTNodeType::Literal(formualizer_common::LiteralValue::Empty) => {
            state.write_u8(TAG_LITERAL_EMPTY);
        }
        ASTNodeType::Literal(formualizer_common::LiteralValue::Array(rows)) => {
            state.write_u8(TAG_LITERAL_EMPTY + 1);
            rows.hash(state);
        }
        ASTNodeType::Reference(r) => hash_reference(r, state),
        ASTNodeType::UnaryOp { op, expr } => {
            state.write_u8(TAG_UNARY);
            op.hash(state);
            hash_node(expr, state);
        }
        ASTNodeType::BinaryOp { op, left, right } => {
            state.write_u8(TAG_BINARY);
            op.hash(state);
            hash_node(left, state);
            hash_node(right, state);
        }
        ASTNodeType::FunctionCall { name, args } => {
            state.write_u8(TAG_CALL);
            name.to_ascii_uppercase().hash(state);
            state.write_usize(args.len());
            for arg in args {
                hash_node(arg, state);
            }
        }
        ASTNodeType::EmptyArg => state.write_u8(TAG_EMPTY_ARG),
    }
}

fn hash_reference<H: Hasher>(r: &ReferenceType, state: &mut H) {
    match r {
        ReferenceType::Cell { sheet, coord } => {
            state.write_u8(TAG_REF_CELL);
            sheet.hash(state);
            hash_relative_axis(coord.row(), coord.row_abs(), state);
            hash_relative_axis(coord.col(), coord.col_abs(), state);
        }
        ReferenceType::Range { sheet, start, end } => {
            state.write_u8(TAG_REF_RANGE);
            sheet.hash(state);
            hash_relative_axis(start.row(), start.row_abs(), state);
            hash_relative_axis(start.col(), start.col_abs(), state);
            hash_relative_axis(end.row(), end.row_abs(), state);
            hash_relative_axis(end.col(), end.col_abs(), state);
        }
        ReferenceType::Name(n) => {
            state.write_u8(TAG_REF_NAME);
            n.hash(state);
        }
    }
}

fn hash_relative_axis<H: Hasher>(value: u32, is_abs: bool, state: &mut H) {
    if is_abs {
        state.write_u8(1);
        value.hash(state);
    } else {
        state.write_u8(TAG_RELATIVE_PLACEHOLDER);
    }
}

const TAG_WORD: u8 = 0xB0;
const TAG_OTHER: u8 = 0xB1;

// One pass over the formula text, skipping whitespace, matching (in order)
// a quoted string, a quoted sheet name, or a maximal run of anything else
// that isn't whitespace or a bare structural character (those fall through
// to the single-character alternative and are hashed one at a time, same as
// every operator/paren/separator in the token-driven walk).
static WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#""(?:[^"\\]|\\.)*"|'(?:[^']|'')*'![^\s,;()+\-*/^&=<>%:"']+(?::[^\s,;()+\-*/^&=<>%:"']+)?|[^\s,;()+\-*/^&=<>%:"']+(?::[^\s,;()+\-*/^&=<>%:"']+)?|.",
    )
    .expect("static regex is valid")
});

/// Lexer-free template hash: scans `formula` directly with a regex instead
/// of tokenizing, classifying each matched word as a reference (erasing its
/// relative axes the same way the token-driven path does) or opaque text
/// (hashed case-insensitively, so `sum(...)` and `SUM(...)` still collide).
/// A separate hash space from [`template_hash`] — the two modes aren't
/// compared against each other, each only needs to be internally stable
/// under formulas that differ solely in their relative operands.
pub fn text_template_hash(formula: &str) -> u64 {
    let mut hasher = FxHasher::default();
    let text = formula.strip_prefix('=').unwrap_or(formula);
    for word in WORD_RE.find_iter(text) {
        let word = word.as_str();
        if word.trim().is_empty() {
            continue; // whitespace carries no template meaning
        }
        hash_word(word, &mut hasher);
    }
    hasher.finish()
}

fn hash_word<H: Hasher>(word: &str, state: &mut H) {
    if word.starts_with('"') {
        state.write_u8(TAG_OTHER);
        word.hash(state);
        return;
    }
    if let Some(reference) = parse_reference_text(word) {
        hash_reference(&reference, state);
        return;
    }
    state.write_u8(TAG_WORD);
    word.to_ascii_uppercase().hash(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::types::FormulaDialect;

    #[test]
    fn relative_operands_share_a_template_hash() {
        let a = parse("=A1+B1", FormulaDialect::Us).unwrap();
        let b = parse("=A2+B2", FormulaDialect::Us).unwrap();
        assert_eq!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn absolute_operands_are_not_erased() {
        let a = parse("=$A$1+B1", FormulaDialect::Us).unwrap();
        let b = parse("=$A$2+B1", FormulaDialect::Us).unwrap();
        assert_ne!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn different_operators_hash_differently() {
        let a = parse("=A1+B1", FormulaDialect::Us).unwrap();
        let b = parse("=A1-B1", FormulaDialect::Us).unwrap();
        assert_ne!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn function_name_case_insensitive() {
        let a = parse("=sum(A1:A2)", FormulaDialect::Us).unwrap();
        let b = parse("=SUM(A1:A2)", FormulaDialect::Us).unwrap();
        assert_eq!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn range_with_relative_corners_shares_hash_across_anchors() {
        let a = parse("=SUM(A1:A3)", FormulaDialect::Us).unwrap();
        let b = parse("=SUM(C5:C7)", FormulaDialect::Us).unwrap();
        assert_eq!(template_hash(&a), template_hash(&b));
    }

    #[test]
    fn text_hash_relative_operands_share_a_hash() {
        assert_eq!(text_template_hash("=A1+B1"), text_template_hash("=A2+B2"));
    }

    #[test]
    fn text_hash_absolute_operands_are_not_erased() {
        assert_ne!(text_template_hash("=$A$1+B1"), text_template_hash("=$A$2+B1"));
    }

    #[test]
    fn text_hash_different_operators_hash_differently() {
        assert_ne!(text_template_hash("=A1+B1"), text_template_hash("=A1-B1"));
    }

    #[test]
    fn text_hash_function_name_case_insensitive() {
        assert_eq!(text_template_hash("=sum(A1:A2)"), text_template_hash("=SUM(A1:A2)"));
    }

    #[test]
    fn text_hash_range_with_relative_corners_shares_hash_across_anchors() {
        assert_eq!(
            text_template_hash("=SUM(A1:A3)"),
            text_template_hash("=SUM(C5:C7)")
        );
    }

    #[test]
    fn text_hash_preserves_quoted_string_content_verbatim() {
        assert_ne!(
            text_template_hash(r#"="a"&A1"#),
            text_template_hash(r#"="b"&A1"#)
        );
    }

    #[test]
    fn text_hash_quoted_sheet_qualifier_is_literal() {
        assert_ne!(
            text_template_hash("='Sheet1'!A1"),
            text_template_hash("='Sheet2'!A1")
        );
    }
}
