//! C7 (interpreter half): walks a bound AST (references already absolutized
//! to concrete sheet/coordinate pairs, structural transforms already
//! replayed by `lazy_transform`) against a read-only value resolver and the
//! function-library collaborator, producing the scalar or array result a
//! vertex caches.

use formualizer_common::{CellRef, ExcelError, ExcelErrorKind, LiteralValue, RangeRef, SheetId};
use formualizer_parse::parser::{ASTNode, ASTNodeType, ReferenceType};

use crate::function_library::{FnArg, FunctionLibrary};

/// Read-only view the evaluator needs of the graph: a producer's current
/// cached value, and whether a reference's cell/range actually resolves (an
/// unresolved sheet name is `Error(ref)`, not a panic).
pub trait CellResolver {
    fn cell_value(&self, cell: CellRef) -> LiteralValue;
    fn range_values(&self, range: RangeRef) -> Vec<Vec<LiteralValue>>;
    fn resolve_sheet(&self, name: &str) -> Option<SheetId>;
}

fn err(kind: ExcelErrorKind) -> LiteralValue {
    LiteralValue::Error(ExcelError::new(kind))
}

fn coerce_sheet(
    sheet: &Option<String>,
    own_sheet: SheetId,
    resolver: &dyn CellResolver,
) -> Option<SheetId> {
    match sheet {
        Some(name) => resolver.resolve_sheet(name),
        None => Some(own_sheet),
    }
}

/// Evaluates `node` to a scalar value, given the sheet the owning vertex
/// lives on (used to resolve unqualified references) and the two external
/// collaborators.
pub fn eval_node(
    node: &ASTNode,
    own_sheet: SheetId,
    resolver: &dyn CellResolver,
    library: &dyn FunctionLibrary,
) -> LiteralValue {
    match &node.node_type {
        ASTNodeType::Literal(v) => v.clone(),
        ASTNodeType::EmptyArg => LiteralValue::Empty,
        ASTNodeType::Reference(ReferenceType::Cell { sheet, coord }) => {
            match coerce_sheet(sheet, own_sheet, resolver) {
                Some(sheet_id) => {
                    resolver.cell_value(CellRef::new(sheet_id, coord.into_absolute()))
                }
                None => err(ExcelErrorKind::Ref),
            }
        }
        ASTNodeType::Reference(ReferenceType::Range { sheet, start, end }) => {
            match coerce_sheet(sheet, own_sheet, resolver) {
                Some(sheet_id) => {
                    let range = RangeRef::new(sheet_id, start.into_absolute(), end.into_absolute());
                    let rows = resolver.range_values(range);
                    if rows.len() == 1 && rows[0].len() == 1 {
                        rows[0][0].clone()
                    } else {
                        LiteralValue::Array(rows)
                    }
                }
                None => err(ExcelErrorKind::Ref),
            }
        }
        ASTNodeType::Reference(ReferenceType::Name(_)) => err(ExcelErrorKind::Name),
        ASTNodeType::UnaryOp { op, expr } => {
            let v = eval_node(expr, own_sheet, resolver, library).coerce_to_single_value();
            if v.is_error() {
                return v;
            }
            match op.as_str() {
                "-" => match v.as_number() {
                    Some(n) => LiteralValue::Number(-n),
                    None => err(ExcelErrorKind::Value),
                },
                "+" => match v.as_number() {
                    Some(n) => LiteralValue::Number(n),
                    None => err(ExcelErrorKind::Value),
                },
                "%" => match v.as_number() {
                    Some(n) => LiteralValue::Number(n / 100.0),
                    None => err(ExcelErrorKind::Value),
                },
                _ => err(ExcelErrorKind::Value),
            }
        }
        ASTNodeType::BinaryOp { op, left, right } => {
            let l = eval_node(left, own_sheet, resolver, library).coerce_to_single_value();
            if l.is_error() {
                return l;
            }
            let r = eval_node(right, own_sheet, resolver, library).coerce_to_single_value();
            if r.is_error() {
                return r;
            }
            eval_binary_op(op, &l, &r)
        }
        ASTNodeType::FunctionCall { name, args } => {
            if !library.contains(name) {
                return err(ExcelErrorKind::Name);
            }
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                match eval_arg(arg, own_sheet, resolver, library) {
                    Ok(a) => evaluated.push(a),
                    Err(e) => return LiteralValue::Error(e),
                }
            }
            library.call(name, &evaluated)
        }
    }
}

/// Evaluates a function-call argument, preserving a range reference's shape
/// (`FnArg::Range`) instead of collapsing it to a scalar the way operator
/// operands do.
fn eval_arg(
    node: &ASTNode,
    own_sheet: SheetId,
    resolver: &dyn CellResolver,
    library: &dyn FunctionLibrary,
) -> Result<FnArg, ExcelError> {
    if let ASTNodeType::Reference(ReferenceType::Range { sheet, start, end }) = &node.node_type {
        return match coerce_sheet(sheet, own_sheet, resolver) {
            Some(sheet_id) => {
                let range = RangeRef::new(sheet_id, start.into_absolute(), end.into_absolute());
                Ok(FnArg::Range(resolver.range_values(range)))
            }
            None => Err(ExcelError::new(ExcelErrorKind::Ref)),
        };
    }
    let v = eval_node(node, own_sheet, resolver, library);
    match v {
        LiteralValue::Error(e) => Err(e),
        LiteralValue::Array(rows) => Ok(FnArg::Range(rows)),
        other => Ok(FnArg::Scalar(other)),
    }
}

fn eval_binary_op(op: &str, left: &LiteralValue, right: &LiteralValue) -> LiteralValue {
    match op {
        "&" => LiteralValue::Text(format!("{left}{right}")),
        "=" | "<>" | "<" | "<=" | ">" | ">=" => eval_comparison(op, left, right),
        _ => eval_arithmetic(op, left, right),
    }
}

fn eval_arithmetic(op: &str, left: &LiteralValue, right: &LiteralValue) -> LiteralValue {
    let (Some(l), Some(r)) = (left.as_number(), right.as_number()) else {
        return err(ExcelErrorKind::Value);
    };
    match op {
        "+" => LiteralValue::Number(l + r),
        "-" => LiteralValue::Number(l - r),
        "*" => LiteralValue::Number(l * r),
        "/" => {
            if r == 0.0 {
                err(ExcelErrorKind::Div)
            } else {
                LiteralValue::Number(l / r)
            }
        }
        "^" => LiteralValue::Number(l.powf(r)),
        _ => err(ExcelErrorKind::Value),
    }
}

fn eval_comparison(op: &str, left: &LiteralValue, right: &LiteralValue) -> LiteralValue {
    let ordering = match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => {
            let l = left.to_string();
            let r = right.to_string();
            Some(l.cmp(&r))
        }
    };
    let Some(ordering) = ordering else {
        return err(ExcelErrorKind::Value);
    };
    use std::cmp::Ordering::*;
    let result = match op {
        "=" => ordering == Equal,
        "<>" => ordering != Equal,
        "<" => ordering == Less,
        "<=" => ordering != Greater,
        ">" => ordering == Greater,
        ">=" => ordering != Less,
        _ => false,
    };
    LiteralValue::Boolean(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_library::BuiltinLibrary;
    use formualizer_parse::parser::parse;
    use formualizer_parse::FormulaDialect;
    use std::collections::HashMap;

    struct FakeSheet {
        values: HashMap<(u32, u32), LiteralValue>,
        sheets: HashMap<String, SheetId>,
    }

    impl CellResolver for FakeSheet {
        fn cell_value(&self, cell: CellRef) -> LiteralValue {
            self.values
                .get(&(cell.row(), cell.col()))
                .cloned()
                .unwrap_or(LiteralValue::Empty)
        }

        fn range_values(&self, range: RangeRef) -> Vec<Vec<LiteralValue>> {
            (range.start.row()..=range.end.row())
                .map(|row| {
                    (range.start.col()..=range.end.col())
                        .map(|col| {
                            self.values
                                .get(&(row, col))
                                .cloned()
                                .unwrap_or(LiteralValue::Empty)
                        })
                        .collect()
                })
                .collect()
        }

        fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
            self.sheets.get(name).copied()
        }
    }

    fn sheet(cells: &[((u32, u32), LiteralValue)]) -> FakeSheet {
        FakeSheet {
            values: cells.iter().cloned().collect(),
            sheets: HashMap::new(),
        }
    }

    #[test]
    fn arithmetic_adds_two_cell_references() {
        let ast = parse("=A1+B1", FormulaDialect::Us).unwrap();
        let s = sheet(&[
            ((0, 0), LiteralValue::Number(2.0)),
            ((0, 1), LiteralValue::Number(3.0)),
        ]);
        let lib = BuiltinLibrary::new();
        assert_eq!(eval_node(&ast, 0, &s, &lib), LiteralValue::Number(5.0));
    }

    #[test]
    fn division_by_zero_is_div_error() {
        let ast = parse("=A1/B1", FormulaDialect::Us).unwrap();
        let s = sheet(&[
            ((0, 0), LiteralValue::Number(1.0)),
            ((0, 1), LiteralValue::Number(0.0)),
        ]);
        let lib = BuiltinLibrary::new();
        assert_eq!(
            eval_node(&ast, 0, &s, &lib),
            LiteralValue::Error(ExcelError::new(ExcelErrorKind::Div))
        );
    }

    #[test]
    fn sum_over_a_range_aggregates_every_cell() {
        let ast = parse("=SUM(A1:A3)", FormulaDialect::Us).unwrap();
        let s = sheet(&[
            ((0, 0), LiteralValue::Number(1.0)),
            ((1, 0), LiteralValue::Number(2.0)),
            ((2, 0), LiteralValue::Number(3.0)),
        ]);
        let lib = BuiltinLibrary::new();
        assert_eq!(eval_node(&ast, 0, &s, &lib), LiteralValue::Number(6.0));
    }

    #[test]
    fn empty_cell_arithmetic_treats_empty_as_zero() {
        let ast = parse("=A1+1", FormulaDialect::Us).unwrap();
        let s = sheet(&[]);
        let lib = BuiltinLibrary::new();
        assert_eq!(eval_node(&ast, 0, &s, &lib), LiteralValue::Number(1.0));
    }

    #[test]
    fn unknown_function_name_is_name_error() {
        let ast = parse("=BOGUS(A1)", FormulaDialect::Us).unwrap();
        let s = sheet(&[]);
        let lib = BuiltinLibrary::new();
        assert_eq!(
            eval_node(&ast, 0, &s, &lib),
            LiteralValue::Error(ExcelError::new(ExcelErrorKind::Name))
        );
    }

    #[test]
    fn concatenation_stringifies_operands() {
        let ast = parse("=A1&\"x\"", FormulaDialect::Us).unwrap();
        let s = sheet(&[((0, 0), LiteralValue::Number(1.0))]);
        let lib = BuiltinLibrary::new();
        assert_eq!(
            eval_node(&ast, 0, &s, &lib),
            LiteralValue::Text("1x".to_string())
        );
    }
}
