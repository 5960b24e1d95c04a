use formualizer_common::RelativeCoord;
use formualizer_parse::parser::{ASTNodeType, ReferenceType};
use formualizer_parse::{parse, template_hash, FormulaDialect, ParseCache};
use proptest::prelude::*;

fn origin(row: u32, col: u32) -> RelativeCoord {
    RelativeCoord::new(row, col, false, false)
}

#[test]
fn integration_nested_formula_builds_expected_shape() {
    let ast = parse("=IF(A1>0,SUM(B1:B3),\"n/a\")", FormulaDialect::Us).unwrap();
    let ASTNodeType::FunctionCall { name, args } = ast.node_type else {
        panic!("expected a function call at the root");
    };
    assert_eq!(name, "IF");
    assert_eq!(args.len(), 3);
    assert!(matches!(args[0].node_type, ASTNodeType::BinaryOp { .. }));
    assert!(matches!(args[1].node_type, ASTNodeType::FunctionCall { .. }));
    assert!(matches!(args[2].node_type, ASTNodeType::Literal(_)));
}

#[test]
fn integration_cache_shares_templates_across_a_column_fill() {
    let cache = ParseCache::new(FormulaDialect::Us);
    for row in 1..=50 {
        cache
            .get_or_parse(&format!("=A{row}*2"), origin(row - 1, 0))
            .unwrap();
    }
    assert_eq!(cache.len(), 1);
}

#[test]
fn integration_intl_dialect_uses_semicolon_separator() {
    let ast = parse("=SUM(A1;A2)", FormulaDialect::Intl).unwrap();
    let ASTNodeType::FunctionCall { args, .. } = ast.node_type else {
        panic!("expected function call");
    };
    assert_eq!(args.len(), 2);
}

#[test]
fn integration_dependencies_of_range_reference_resolve_to_single_entry() {
    let ast = parse("=SUM(Sheet2!A1:C3)", FormulaDialect::Us).unwrap();
    let deps = ast.get_dependencies();
    assert_eq!(deps.len(), 1);
    assert!(matches!(deps[0], ReferenceType::Range { .. }));
}

proptest! {
    // Relative-operand invariance: translating every relative cell
    // reference in a formula by the same (row, col) delta must not change
    // its template hash, since the template is shared across a fill.
    #[test]
    fn template_hash_is_invariant_under_uniform_row_shift(shift in 1u32..500) {
        let base = format!("=A1+B1*SUM(C1:C3)");
        let shifted = format!("=A{}+B{}*SUM(C{}:C{})", shift + 1, shift + 1, shift + 1, shift + 3);
        let a = parse(&base, FormulaDialect::Us).unwrap();
        let b = parse(&shifted, FormulaDialect::Us).unwrap();
        prop_assert_eq!(template_hash(&a), template_hash(&b));
    }
}
