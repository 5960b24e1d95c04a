//! C1: two-level sparse store from (sheet, column, row) to vertex identity.
//! Outer index is the sheet id, inner index is the column, and each column
//! keeps its occupied rows in a `BTreeMap` so row-span queries and the shifts
//! a structural operation needs are both cheap and only touch affected
//! cells, never the whole sheet.

use std::collections::BTreeMap;

use formualizer_common::{CellRef, SheetId};
use rustc_hash::FxHashMap;

use crate::vertex::VertexId;

#[derive(Default)]
struct SheetColumns {
    columns: FxHashMap<u32, BTreeMap<u32, VertexId>>,
}

#[derive(Default)]
pub struct AddressMapping {
    sheets: FxHashMap<SheetId, SheetColumns>,
}

impl AddressMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: CellRef) -> Option<VertexId> {
        self.sheets
            .get(&addr.sheet)?
            .columns
            .get(&addr.col())?
            .get(&addr.row())
            .copied()
    }

    pub fn has(&self, addr: CellRef) -> bool {
        self.get(addr).is_some()
    }

    pub fn set(&mut self, addr: CellRef, id: VertexId) {
        self.sheets
            .entry(addr.sheet)
            .or_default()
            .columns
            .entry(addr.col())
            .or_default()
            .insert(addr.row(), id);
    }

    pub fn remove(&mut self, addr: CellRef) -> Option<VertexId> {
        let sheet = self.sheets.get_mut(&addr.sheet)?;
        let col = sheet.columns.get_mut(&addr.col())?;
        let removed = col.remove(&addr.row());
        if col.is_empty() {
            sheet.columns.remove(&addr.col());
        }
        removed
    }

    /// Every occupied `(row, id)` pair in `col`, row-ascending.
    pub fn column_entries(&self, sheet: SheetId, col: u32) -> Vec<(u32, VertexId)> {
        self.sheets
            .get(&sheet)
            .and_then(|s| s.columns.get(&col))
            .map(|rows| rows.iter().map(|(r, id)| (*r, *id)).collect())
            .unwrap_or_default()
    }

    /// All occupied cells on `sheet` whose row lies in `[row_start, row_end]`.
    pub fn cells_in_row_span(
        &self,
        sheet: SheetId,
        row_start: u32,
        row_end: u32,
    ) -> Vec<(CellRef, VertexId)> {
        let Some(s) = self.sheets.get(&sheet) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (&col, rows) in &s.columns {
            for (&row, &id) in rows.range(row_start..=row_end) {
                out.push((CellRef::from_rc(sheet, row, col), id));
            }
        }
        out
    }

    pub fn cells_in_col_span(
        &self,
        sheet: SheetId,
        col_start: u32,
        col_end: u32,
    ) -> Vec<(CellRef, VertexId)> {
        let Some(s) = self.sheets.get(&sheet) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for col in col_start..=col_end {
            if let Some(rows) = s.columns.get(&col) {
                for (&row, &id) in rows {
                    out.push((CellRef::from_rc(sheet, row, col), id));
                }
            }
        }
        out
    }

    pub fn all_cells(&self, sheet: SheetId) -> Vec<(CellRef, VertexId)> {
        let Some(s) = self.sheets.get(&sheet) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (&col, rows) in &s.columns {
            for (&row, &id) in rows {
                out.push((CellRef::from_rc(sheet, row, col), id));
            }
        }
        out
    }

    /// Shifts every occupied cell at or after `row_start` by `delta` rows
    /// (positive for insert, negative for delete); cells that would land
    /// below `row_start` after a negative delta are dropped by the caller
    /// before invoking this (they've already been turned into `Error(ref)`).
    pub fn shift_rows(&mut self, sheet: SheetId, row_start: u32, delta: i64) {
        let Some(s) = self.sheets.get_mut(&sheet) else {
            return;
        };
        for rows in s.columns.values_mut() {
            let moved: Vec<(u32, VertexId)> = rows
                .range(row_start..)
                .map(|(&r, &id)| (r, id))
                .collect();
            for (row, _) in &moved {
                rows.remove(row);
            }
            for (row, id) in moved {
                let new_row = (row as i64 + delta).max(0) as u32;
                rows.insert(new_row, id);
            }
        }
    }

    pub fn shift_columns(&mut self, sheet: SheetId, col_start: u32, delta: i64) {
        let Some(s) = self.sheets.get_mut(&sheet) else {
            return;
        };
        let moved_cols: Vec<u32> = s
            .columns
            .keys()
            .copied()
            .filter(|&c| c >= col_start)
            .collect();
        let mut extracted = Vec::new();
        for col in moved_cols {
            if let Some(rows) = s.columns.remove(&col) {
                extracted.push((col, rows));
            }
        }
        for (col, rows) in extracted {
            let new_col = (col as i64 + delta).max(0) as u32;
            s.columns.insert(new_col, rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formualizer_common::Coord;

    fn cell(sheet: SheetId, row: u32, col: u32) -> CellRef {
        CellRef::new(sheet, Coord::new(row, col))
    }

    #[test]
    fn set_get_remove_roundtrip() {
        let mut m = AddressMapping::new();
        let addr = cell(0, 2, 3);
        m.set(addr, VertexId(7));
        assert_eq!(m.get(addr), Some(VertexId(7)));
        assert_eq!(m.remove(addr), Some(VertexId(7)));
        assert!(!m.has(addr));
    }

    #[test]
    fn shift_rows_moves_only_affected_rows() {
        let mut m = AddressMapping::new();
        m.set(cell(0, 0, 0), VertexId(1));
        m.set(cell(0, 5, 0), VertexId(2));
        m.set(cell(0, 10, 0), VertexId(3));
        m.shift_rows(0, 5, 1);
        assert_eq!(m.get(cell(0, 0, 0)), Some(VertexId(1)));
        assert_eq!(m.get(cell(0, 6, 0)), Some(VertexId(2)));
        assert_eq!(m.get(cell(0, 11, 0)), Some(VertexId(3)));
    }

    #[test]
    fn row_span_only_returns_matching_rows() {
        let mut m = AddressMapping::new();
        m.set(cell(0, 0, 0), VertexId(1));
        m.set(cell(0, 1, 0), VertexId(2));
        m.set(cell(0, 2, 0), VertexId(3));
        let span = m.cells_in_row_span(0, 1, 2);
        assert_eq!(span.len(), 2);
    }
}
