//! C8: pure rewriting rules for row/column insertion, deletion, and cell
//! moves. These functions know nothing about the graph or the lazy queue —
//! they take a concrete (already-rebased) AST plus a transform description
//! and return the rewritten AST, or `None`/an `Error(ref)` substitution for
//! a reference that the operation invalidated. `lazy_transform` is the
//! caller that decides *when* to run these against a vertex's tree.

use formualizer_common::{ExcelError, ExcelErrorKind, LiteralValue, RangeRef, RelativeCoord, SheetId};
use formualizer_parse::parser::{ASTNode, ASTNodeType, ReferenceType};

use crate::sheet_mapping::SheetMapping;

#[derive(Debug, Clone, Copy)]
pub enum TransformKind {
    AddRows { sheet: SheetId, row_start: u32, count: u32 },
    RemoveRows { sheet: SheetId, row_start: u32, row_end: u32 },
    AddColumns { sheet: SheetId, col_start: u32, count: u32 },
    RemoveColumns { sheet: SheetId, col_start: u32, col_end: u32 },
    Move {
        source: RangeRef,
        d_row: i64,
        d_col: i64,
        d_sheet: SheetId,
    },
}

/// The sheet a row/column transform targets, or `None` for `Move` (whose
/// sheet-scoping lives on `source`/`d_sheet` instead, handled separately
/// since a move's source and destination sheets can differ).
fn kind_sheet(kind: &TransformKind) -> Option<SheetId> {
    match kind {
        TransformKind::AddRows { sheet, .. }
        | TransformKind::RemoveRows { sheet, .. }
        | TransformKind::AddColumns { sheet, .. }
        | TransformKind::RemoveColumns { sheet, .. } => Some(*sheet),
        TransformKind::Move { .. } => None,
    }
}

/// Resolves a reference's sheet qualifier against the formula's own sheet —
/// an explicit `Sheet1!` prefix wins, otherwise the reference lives on
/// `own_sheet`. `None` means the qualifier names a sheet this workbook has
/// never seen, so the reference cannot be the target of any transform
/// record and is left untouched by the caller.
fn resolve_ref_sheet(sheet: &Option<String>, own_sheet: SheetId, sheets: &SheetMapping) -> Option<SheetId> {
    match sheet {
        Some(name) => sheets.resolve(name),
        None => Some(own_sheet),
    }
}

/// Shifts a single axis value for an insert, leaving values before the
/// insertion point untouched.
fn shift_insert(value: u32, start: u32, count: u32) -> u32 {
    if value >= start {
        value + count
    } else {
        value
    }
}

/// Shifts/clamps a single axis value for a deletion of `[cut_start, cut_end]`.
/// `is_start_corner` picks which boundary a value landing inside the cut
/// clamps to when it belongs to a range corner rather than a lone cell
/// (`is_start_corner` is irrelevant, and ignored, for a lone cell — callers
/// pass `true` and treat `None` as "reference is gone").
fn shift_remove(value: u32, cut_start: u32, cut_end: u32, is_start_corner: bool) -> Option<u32> {
    let count = cut_end - cut_start + 1;
    if value > cut_end {
        Some(value - count)
    } else if value < cut_start {
        Some(value)
    } else if is_start_corner {
        Some(cut_start)
    } else if cut_start == 0 {
        None
    } else {
        Some(cut_start - 1)
    }
}

fn insert_axis(kind: &TransformKind) -> Option<(u32, u32)> {
    match kind {
        TransformKind::AddRows { row_start, count, .. } => Some((*row_start, *count)),
        TransformKind::AddColumns { col_start, count, .. } => Some((*col_start, *count)),
        _ => None,
    }
}

fn remove_axis(kind: &TransformKind) -> Option<(u32, u32)> {
    match kind {
        TransformKind::RemoveRows { row_start, row_end, .. } => Some((*row_start, *row_end)),
        TransformKind::RemoveColumns { col_start, col_end, .. } => Some((*col_start, *col_end)),
        _ => None,
    }
}

fn is_row_axis(kind: &TransformKind) -> bool {
    matches!(
        kind,
        TransformKind::AddRows { .. } | TransformKind::RemoveRows { .. }
    )
}

/// Rewrites one coordinate for a lone-cell reference living on `ref_sheet`.
/// `None` means the target row/column was deleted: the whole reference
/// becomes `Error(ref)`. A reference whose sheet doesn't match the record's
/// target sheet (`source.sheet` for `Move`, `sheet` for the row/column
/// variants) is returned unchanged — the transform doesn't apply to it.
fn transform_coord(coord: RelativeCoord, ref_sheet: SheetId, kind: &TransformKind) -> Option<RelativeCoord> {
    if let TransformKind::Move {
        source,
        d_row,
        d_col,
        d_sheet: _,
    } = kind
    {
        if ref_sheet != source.sheet {
            return Some(coord);
        }
        let row = coord.row();
        let col = coord.col();
        if row >= source.start.row()
            && row <= source.end.row()
            && col >= source.start.col()
            && col <= source.end.col()
        {
            let new_row = (row as i64 + d_row).max(0) as u32;
            let new_col = (col as i64 + d_col).max(0) as u32;
            return Some(coord.with_row(new_row).with_col(new_col));
        }
        return Some(coord);
    }
    if let Some(sheet) = kind_sheet(kind) {
        if ref_sheet != sheet {
            return Some(coord);
        }
    }
    if let Some((start, count)) = insert_axis(kind) {
        if is_row_axis(kind) {
            return Some(coord.with_row(shift_insert(coord.row(), start, count)));
        }
        return Some(coord.with_col(shift_insert(coord.col(), start, count)));
    }
    if let Some((cut_start, cut_end)) = remove_axis(kind) {
        if is_row_axis(kind) {
            return shift_remove(coord.row(), cut_start, cut_end, true)
                .map(|r| coord.with_row(r));
        }
        return shift_remove(coord.col(), cut_start, cut_end, true).map(|c| coord.with_col(c));
    }
    Some(coord)
}

/// Rewrites a range's two corners, for a reference living on `ref_sheet`.
/// Returns `None` if the entire rectangle fell inside a deleted span (whole
/// reference becomes `Error(ref)`).
fn transform_range_corners(
    start: RelativeCoord,
    end: RelativeCoord,
    ref_sheet: SheetId,
    kind: &TransformKind,
) -> Option<(RelativeCoord, RelativeCoord)> {
    if let TransformKind::Move { source, .. } = kind {
        if ref_sheet != source.sheet {
            return Some((start, end));
        }
        let new_start = transform_coord(start, ref_sheet, kind)?;
        let new_end = transform_coord(end, ref_sheet, kind)?;
        return Some((new_start, new_end));
    }
    if let Some(sheet) = kind_sheet(kind) {
        if ref_sheet != sheet {
            return Some((start, end));
        }
    }
    if let Some((cut_start, cut_end)) = remove_axis(kind) {
        let axis_row = is_row_axis(kind);
        let (s, e) = if axis_row {
            (start.row(), end.row())
        } else {
            (start.col(), end.col())
        };
        if s >= cut_start && e <= cut_end {
            return None; // entirely removed
        }
        let new_s = shift_remove(s, cut_start, cut_end, true)?;
        let new_e = shift_remove(e, cut_start, cut_end, false)?;
        return Some(if axis_row {
            (start.with_row(new_s), end.with_row(new_e))
        } else {
            (start.with_col(new_s), end.with_col(new_e))
        });
    }
    let new_start = transform_coord(start, ref_sheet, kind)?;
    let new_end = transform_coord(end, ref_sheet, kind)?;
    Some((new_start, new_end))
}

fn error_node(kind: ExcelErrorKind, span: (usize, usize)) -> ASTNode {
    ASTNode {
        node_type: ASTNodeType::Literal(LiteralValue::Error(ExcelError::new(kind))),
        start: span.0,
        end: span.1,
    }
}

/// Rewrites every reference inside `node`, recursively, per `kind`. A
/// reference qualifies for rewriting only when its resolved sheet (its own
/// explicit `Sheet!` qualifier, or `own_sheet` — the carrier formula's sheet
/// — when unqualified) matches the record's target sheet; references on any
/// other sheet pass through untouched. Returns a new tree; `node` itself is
/// left untouched (callers already hold the shared `Arc` and must not
/// mutate through it).
pub fn transform_ast(
    node: &ASTNode,
    own_sheet: SheetId,
    sheets: &SheetMapping,
    kind: &TransformKind,
) -> ASTNode {
    let node_type = match &node.node_type {
        ASTNodeType::Reference(ReferenceType::Cell { sheet, coord }) => {
            match resolve_ref_sheet(sheet, own_sheet, sheets) {
                Some(ref_sheet) => match transform_coord(*coord, ref_sheet, kind) {
                    Some(new_coord) => ASTNodeType::Reference(ReferenceType::Cell {
                        sheet: sheet.clone(),
                        coord: new_coord,
                    }),
                    None => {
                        return error_node(ExcelErrorKind::Ref, (node.start, node.end));
                    }
                },
                None => ASTNodeType::Reference(ReferenceType::Cell {
                    sheet: sheet.clone(),
                    coord: *coord,
                }),
            }
        }
        ASTNodeType::Reference(ReferenceType::Range { sheet, start, end }) => {
            match resolve_ref_sheet(sheet, own_sheet, sheets) {
                Some(ref_sheet) => match transform_range_corners(*start, *end, ref_sheet, kind) {
                    Some((new_start, new_end)) => ASTNodeType::Reference(ReferenceType::Range {
                        sheet: sheet.clone(),
                        start: new_start,
                        end: new_end,
                    }),
                    None => {
                        return error_node(ExcelErrorKind::Ref, (node.start, node.end));
                    }
                },
                None => ASTNodeType::Reference(ReferenceType::Range {
                    sheet: sheet.clone(),
                    start: *start,
                    end: *end,
                }),
            }
        }
        ASTNodeType::Reference(ReferenceType::Name(n)) => {
            ASTNodeType::Reference(ReferenceType::Name(n.clone()))
        }
        ASTNodeType::Literal(v) => ASTNodeType::Literal(v.clone()),
        ASTNodeType::EmptyArg => ASTNodeType::EmptyArg,
        ASTNodeType::UnaryOp { op, expr } => ASTNodeType::UnaryOp {
            op: op.clone(),
            expr: Box::new(transform_ast(expr, own_sheet, sheets, kind)),
        },
        ASTNodeType::BinaryOp { op, left, right } => ASTNodeType::BinaryOp {
            op: op.clone(),
            left: Box::new(transform_ast(left, own_sheet, sheets, kind)),
            right: Box::new(transform_ast(right, own_sheet, sheets, kind)),
        },
        ASTNodeType::FunctionCall { name, args } => ASTNodeType::FunctionCall {
            name: name.clone(),
            args: args
                .iter()
                .map(|a| transform_ast(a, own_sheet, sheets, kind))
                .collect(),
        },
    };
    ASTNode {
        node_type,
        start: node.start,
        end: node.end,
    }
}

/// Shifts a whole rectangle (used for range/matrix mapping bookkeeping, not
/// AST rewriting) the same way `transform_coord` shifts a lone reference.
pub fn transform_rect(rect: RangeRef, kind: &TransformKind) -> Option<RangeRef> {
    let start = RelativeCoord::from(rect.start);
    let end = RelativeCoord::from(rect.end);
    let (new_start, new_end) = transform_range_corners(start, end, rect.sheet, kind)?;
    let sheet = if let TransformKind::Move { d_sheet, .. } = kind {
        *d_sheet
    } else {
        rect.sheet
    };
    Some(RangeRef::new(
        sheet,
        new_start.into_absolute(),
        new_end.into_absolute(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use formualizer_common::Coord;
    use formualizer_parse::parser::parse;
    use formualizer_parse::FormulaDialect;

    fn no_sheets() -> SheetMapping {
        SheetMapping::new()
    }

    #[test]
    fn add_rows_shifts_reference_at_or_below_start() {
        let ast = parse("=A5", FormulaDialect::Us).unwrap();
        let kind = TransformKind::AddRows {
            sheet: 0,
            row_start: 2,
            count: 3,
        };
        let out = transform_ast(&ast, 0, &no_sheets(), &kind);
        if let ASTNodeType::Reference(ReferenceType::Cell { coord, .. }) = out.node_type {
            assert_eq!(coord.row(), 7);
        } else {
            panic!("expected reference");
        }
    }

    #[test]
    fn add_rows_leaves_reference_above_start_untouched() {
        let ast = parse("=A1", FormulaDialect::Us).unwrap();
        let kind = TransformKind::AddRows {
            sheet: 0,
            row_start: 2,
            count: 3,
        };
        let out = transform_ast(&ast, 0, &no_sheets(), &kind);
        if let ASTNodeType::Reference(ReferenceType::Cell { coord, .. }) = out.node_type {
            assert_eq!(coord.row(), 0);
        } else {
            panic!("expected reference");
        }
    }

    #[test]
    fn add_rows_on_a_different_sheet_leaves_this_formula_untouched() {
        // Formula lives on sheet 1; the transform targets sheet 0.
        let ast = parse("=A5", FormulaDialect::Us).unwrap();
        let kind = TransformKind::AddRows {
            sheet: 0,
            row_start: 2,
            count: 3,
        };
        let out = transform_ast(&ast, 1, &no_sheets(), &kind);
        if let ASTNodeType::Reference(ReferenceType::Cell { coord, .. }) = out.node_type {
            assert_eq!(coord.row(), 4); // unchanged (A5 is row index 4)
        } else {
            panic!("expected reference");
        }
    }

    #[test]
    fn remove_rows_turns_dangling_reference_into_ref_error() {
        let ast = parse("=A3", FormulaDialect::Us).unwrap();
        let kind = TransformKind::RemoveRows {
            sheet: 0,
            row_start: 1,
            row_end: 3,
        };
        let out = transform_ast(&ast, 0, &no_sheets(), &kind);
        assert!(matches!(
            out.node_type,
            ASTNodeType::Literal(LiteralValue::Error(e)) if e.kind == ExcelErrorKind::Ref
        ));
    }

    #[test]
    fn remove_rows_shrinks_straddling_range() {
        let ast = parse("=SUM(A1:A10)", FormulaDialect::Us).unwrap();
        let kind = TransformKind::RemoveRows {
            sheet: 0,
            row_start: 5,
            row_end: 6,
        };
        let out = transform_ast(&ast, 0, &no_sheets(), &kind);
        if let ASTNodeType::FunctionCall { args, .. } = out.node_type {
            if let ASTNodeType::Reference(ReferenceType::Range { start, end, .. }) =
                &args[0].node_type
            {
                assert_eq!(start.row(), 0);
                assert_eq!(end.row(), 7); // rows 0..=9 minus 2 removed = 0..=7
            } else {
                panic!("expected range");
            }
        } else {
            panic!("expected function call");
        }
    }

    #[test]
    fn remove_rows_entirely_inside_becomes_ref_error() {
        let ast = parse("=SUM(A2:A3)", FormulaDialect::Us).unwrap();
        let kind = TransformKind::RemoveRows {
            sheet: 0,
            row_start: 0,
            row_end: 5,
        };
        let out = transform_ast(&ast, 0, &no_sheets(), &kind);
        if let ASTNodeType::FunctionCall { args, .. } = out.node_type {
            assert!(matches!(
                args[0].node_type,
                ASTNodeType::Literal(LiteralValue::Error(_))
            ));
        } else {
            panic!("expected function call");
        }
    }

    #[test]
    fn move_retargets_references_inside_source_rectangle() {
        let ast = parse("=A1", FormulaDialect::Us).unwrap();
        let kind = TransformKind::Move {
            source: RangeRef::new(0, Coord::new(0, 0), Coord::new(2, 2)),
            d_row: 5,
            d_col: 0,
            d_sheet: 0,
        };
        let out = transform_ast(&ast, 0, &no_sheets(), &kind);
        if let ASTNodeType::Reference(ReferenceType::Cell { coord, .. }) = out.node_type {
            assert_eq!(coord.row(), 5);
        } else {
            panic!("expected reference");
        }
    }

    #[test]
    fn move_on_a_different_sheet_than_source_leaves_reference_untouched() {
        // Same row/col window as `source`, but this reference lives on a
        // different sheet than the moved range — must not be retargeted.
        let ast = parse("=A1", FormulaDialect::Us).unwrap();
        let kind = TransformKind::Move {
            source: RangeRef::new(0, Coord::new(0, 0), Coord::new(2, 2)),
            d_row: 5,
            d_col: 0,
            d_sheet: 0,
        };
        let out = transform_ast(&ast, 1, &no_sheets(), &kind);
        if let ASTNodeType::Reference(ReferenceType::Cell { coord, .. }) = out.node_type {
            assert_eq!(coord.row(), 0);
        } else {
            panic!("expected reference");
        }
    }

    #[test]
    fn add_rows_preserves_template_hash() {
        use formualizer_parse::template_hash;
        let a = parse("=A1+B1", FormulaDialect::Us).unwrap();
        let kind = TransformKind::AddRows {
            sheet: 0,
            row_start: 0,
            count: 4,
        };
        let b = transform_ast(&a, 0, &no_sheets(), &kind);
        assert_eq!(template_hash(&a), template_hash(&b));
    }
}
