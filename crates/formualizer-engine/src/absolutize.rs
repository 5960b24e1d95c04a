//! Binds a parser template's relative references to a concrete vertex.
//!
//! A template cached by `formualizer_parse::ParseCache` carries coordinates
//! that are only meaningful relative to the cell that *first* produced that
//! template (its `origin`). Any other cell reusing the same cached `Arc`
//! (because its own formula text hashed identically) must rebase each
//! reference from `origin` onto its own address before the coordinate means
//! anything — this is the mechanism that lets `=A1+B1` at `C1` and
//! `=A2+B2` at `C2` share one parsed tree while still producing distinct,
//! correct dependency lists.

use formualizer_common::{CellRef, RangeRef, RelativeCoord, SheetId};
use formualizer_parse::parser::{ASTNode, ReferenceType};

use crate::sheet_mapping::SheetMapping;
use crate::vertex::AbsRef;

pub fn anchor_of(cell: CellRef) -> RelativeCoord {
    RelativeCoord::new(cell.row(), cell.col(), false, false)
}

/// Resolves a reference's sheet qualifier against the cell it lives in: an
/// explicit `Sheet1!` prefix always wins, otherwise the reference is local
/// to the owning cell's own sheet.
fn resolve_sheet(sheet: &Option<String>, own_sheet: SheetId, sheets: &mut SheetMapping) -> SheetId {
    match sheet {
        Some(name) => sheets.fetch(name),
        None => own_sheet,
    }
}

/// Rebases a single template reference onto `own_cell`, returning `None` for
/// named references (no positional meaning; resolved to `Error(name)` by the
/// interpreter instead of a graph edge).
pub fn absolutize_reference(
    reference: &ReferenceType,
    origin: RelativeCoord,
    own_cell: CellRef,
    sheets: &mut SheetMapping,
) -> Option<AbsRef> {
    let target = anchor_of(own_cell);
    match reference {
        ReferenceType::Cell { sheet, coord } => {
            let sheet_id = resolve_sheet(sheet, own_cell.sheet, sheets);
            let rebased = coord.rebase(origin, target);
            Some(AbsRef::Cell(CellRef::new(sheet_id, rebased.into_absolute())))
        }
        ReferenceType::Range { sheet, start, end } => {
            let sheet_id = resolve_sheet(sheet, own_cell.sheet, sheets);
            let rebased_start = start.rebase(origin, target).into_absolute();
            let rebased_end = end.rebase(origin, target).into_absolute();
            Some(AbsRef::Range(RangeRef::new(
                sheet_id,
                rebased_start,
                rebased_end,
            )))
        }
        ReferenceType::Name(_) => None,
    }
}

/// Absolutizes every dependency `ast` carries, in source order, dropping
/// unresolvable named references (they still appear in the AST itself and
/// evaluate to `Error(name)`, they simply create no graph edge).
pub fn absolutize_dependencies(
    ast: &ASTNode,
    origin: RelativeCoord,
    own_cell: CellRef,
    sheets: &mut SheetMapping,
) -> Vec<AbsRef> {
    ast.get_dependencies()
        .into_iter()
        .filter_map(|r| absolutize_reference(r, origin, own_cell, sheets))
        .collect()
}
