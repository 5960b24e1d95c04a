//! C3: tracks the non-overlapping rectangles array formulas / numeric
//! matrices occupy. Every structural operation must ask this mapping
//! "would you be split?" before touching the graph, so the overlap query is
//! a sorted-by-row-start index per sheet, binary-searched rather than
//! scanned (sub-linear, per the contract in 4.2).

use formualizer_common::RangeRef;
use rustc_hash::FxHashMap;

use crate::vertex::VertexId;

#[derive(Default)]
struct SheetMatrices {
    /// Sorted by `rect.start.row()`; binary search finds the first
    /// candidate whose row range could overlap a query.
    entries: Vec<(RangeRef, VertexId)>,
}

#[derive(Default)]
pub struct MatrixMapping {
    sheets: FxHashMap<u32, SheetMatrices>,
}

impl MatrixMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rect: RangeRef, id: VertexId) {
        let sheet = self.sheets.entry(rect.sheet).or_default();
        let pos = sheet
            .entries
            .partition_point(|(r, _)| r.start.row() < rect.start.row());
        sheet.entries.insert(pos, (rect, id));
    }

    pub fn remove(&mut self, rect: &RangeRef) {
        if let Some(sheet) = self.sheets.get_mut(&rect.sheet) {
            sheet.entries.retain(|(r, _)| r != rect);
        }
    }

    /// First matrix rectangle overlapping `query`, if any.
    pub fn find_overlap(&self, query: &RangeRef) -> Option<(RangeRef, VertexId)> {
        let sheet = self.sheets.get(&query.sheet)?;
        // Every rectangle whose start row could possibly overlap has
        // start.row() <= query.end.row(); everything after that point in
        // the sorted order starts below the query and cannot overlap.
        let upper = sheet
            .entries
            .partition_point(|(r, _)| r.start.row() <= query.end.row());
        sheet.entries[..upper]
            .iter()
            .find(|(r, _)| r.intersects(query))
            .copied()
    }

    pub fn overlaps(&self, query: &RangeRef) -> bool {
        self.find_overlap(query).is_some()
    }

    pub fn covering(&self, cell: formualizer_common::CellRef) -> Option<VertexId> {
        let sheet = self.sheets.get(&cell.sheet)?;
        sheet
            .entries
            .iter()
            .find(|(r, _)| r.contains(cell))
            .map(|(_, id)| *id)
    }

    pub fn rekey(&mut self, old: &RangeRef, new: RangeRef, id: VertexId) {
        self.remove(old);
        self.insert(new, id);
    }

    /// Every matrix rectangle interned on `sheet`, used by structural ops to
    /// check whether an insert/delete point falls inside one of them.
    pub fn on_sheet(&self, sheet: u32) -> impl Iterator<Item = &(RangeRef, VertexId)> {
        self.sheets.get(&sheet).map(|s| s.entries.iter()).into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.sheets.values().map(|s| s.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formualizer_common::Coord;

    fn rect(r0: u32, c0: u32, r1: u32, c1: u32) -> RangeRef {
        RangeRef::new(0, Coord::new(r0, c0), Coord::new(r1, c1))
    }

    #[test]
    fn detects_overlap_with_existing_matrix() {
        let mut m = MatrixMapping::new();
        m.insert(rect(0, 0, 2, 2), VertexId(1));
        assert!(m.overlaps(&rect(1, 1, 3, 3)));
        assert!(!m.overlaps(&rect(3, 3, 4, 4)));
    }

    #[test]
    fn covering_finds_the_owning_matrix_for_an_interior_cell() {
        let mut m = MatrixMapping::new();
        m.insert(rect(0, 0, 4, 4), VertexId(9));
        let inner = formualizer_common::CellRef::from_rc(0, 2, 2);
        assert_eq!(m.covering(inner), Some(VertexId(9)));
    }

    #[test]
    fn remove_then_query_finds_nothing() {
        let mut m = MatrixMapping::new();
        let r = rect(0, 0, 1, 1);
        m.insert(r, VertexId(1));
        m.remove(&r);
        assert!(!m.overlaps(&r));
    }
}
