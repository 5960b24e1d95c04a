//! Embeddable spreadsheet calculation engine. [`Engine`] is the one type most
//! callers need: it owns a [`DependencyGraph`], a [`FunctionLibrary`], and an
//! [`EngineConfig`], and exposes the read/write surface a host application
//! drives a sheet through, accepting plain `"A1"`/`"A1:B2"` text addresses
//! instead of the graph's internal coordinate types.

pub mod address_text;
pub mod error;

use formualizer_common::{LiteralValue, SheetId};
use formualizer_engine::function_library::{BuiltinLibrary, FunctionLibrary};
use formualizer_engine::{DependencyGraph, EngineConfig, TransformError};
use formualizer_parse::FormulaDialect;

pub use error::EngineError;

/// Spreadsheet content ingested through [`Engine::set_cell_content`], before
/// it is routed to the matching `DependencyGraph` mutator.
#[derive(Debug, Clone, PartialEq)]
enum CellContent {
    Empty,
    Formula(String),
    ArrayFormula(String),
    Number(f64),
    Text(String),
}

/// Classifies raw cell text the way a spreadsheet host's editor would: a
/// leading `=` is a formula, `{=...}` is an array formula meant to be spread
/// over a rectangle, an empty string clears the cell, a string parseable as a
/// number becomes `Number`, anything else is `Text`.
fn classify(text: &str) -> CellContent {
    if text.is_empty() {
        return CellContent::Empty;
    }
    if let Some(inner) = text.strip_prefix("{=").and_then(|s| s.strip_suffix('}')) {
        return CellContent::ArrayFormula(inner.to_string());
    }
    if let Some(formula) = text.strip_prefix('=') {
        return CellContent::Formula(formula.to_string());
    }
    match text.trim().parse::<f64>() {
        Ok(n) => CellContent::Number(n),
        Err(_) => CellContent::Text(text.to_string()),
    }
}

/// Embeddable calculation engine: a dependency graph plus the configuration
/// and function library it evaluates against.
pub struct Engine {
    graph: DependencyGraph,
    config: EngineConfig,
    library: Box<dyn FunctionLibrary>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Maps the configured function-argument separator onto the parser's
/// dialect: `,` is the US locale, anything else (in practice `;`) is the
/// international one, which also repoints the decimal point to `,`.
fn dialect_for_separator(sep: char) -> FormulaDialect {
    match sep {
        ',' => FormulaDialect::Us,
        _ => FormulaDialect::Intl,
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let dialect = dialect_for_separator(config.function_arg_separator);
        Self {
            graph: DependencyGraph::new(dialect),
            config,
            library: Box::new(BuiltinLibrary::new()),
        }
    }

    /// Builds an engine with a single sheet seeded from a row-major grid of
    /// cell text, applying the same ingestion grammar as
    /// [`Engine::set_cell_content`] to every non-empty cell.
    pub fn from_sheet_data(name: &str, rows: &[Vec<String>]) -> Result<Self, EngineError> {
        Self::from_workbook(std::slice::from_ref(&(name.to_string(), rows.to_vec())))
    }

    /// Builds an engine from several named sheets at once, recomputing only
    /// after every cell has been ingested.
    pub fn from_workbook(sheets: &[(String, Vec<Vec<String>>)]) -> Result<Self, EngineError> {
        let mut engine = Self::default();
        for (name, rows) in sheets {
            let sheet = engine.sheet_id(name);
            for (row_idx, row) in rows.iter().enumerate() {
                for (col_idx, text) in row.iter().enumerate() {
                    if text.is_empty() {
                        continue;
                    }
                    let addr = format!(
                        "{}{}",
                        formualizer_common::RelativeCoord::col_to_letters(col_idx as u32),
                        row_idx + 1
                    );
                    engine.set_cell_content(sheet, &addr, text)?;
                }
            }
        }
        engine.recompute();
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Looks up a sheet by name, creating it (with the next dense id) if it
    /// hasn't been seen before.
    pub fn sheet_id(&mut self, name: &str) -> SheetId {
        self.graph.sheets.fetch(name)
    }

    pub fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.graph.sheets.name(sheet)
    }

    pub fn resolve_sheet(&self, name: &str) -> Option<SheetId> {
        self.graph.sheets.resolve(name)
    }

    fn recompute(&mut self) {
        self.graph.recompute(&*self.library);
    }

    // ---- queries ----------------------------------------------------------

    pub fn get_cell_value(&self, sheet: SheetId, address: &str) -> Result<LiteralValue, EngineError> {
        let coord = address_text::parse_cell(address)?;
        let cell = formualizer_common::CellRef::new(sheet, coord);
        Ok(self.graph.get_cell_value(cell))
    }

    /// Every cell's value across the sheet's occupied rectangle, row-major.
    pub fn get_values(&self, sheet: SheetId) -> Vec<Vec<LiteralValue>> {
        let (rows, cols) = self.graph.sheet_extent(sheet);
        (0..rows)
            .map(|row| {
                (0..cols)
                    .map(|col| self.graph.get_cell_value(formualizer_common::CellRef::from_rc(sheet, row, col)))
                    .collect()
            })
            .collect()
    }

    /// `(rows, cols)` a sheet's occupied extent.
    pub fn get_sheet_dimensions(&self, sheet: SheetId) -> (u32, u32) {
        self.graph.sheet_extent(sheet)
    }

    pub fn get_sheets_dimensions(&self) -> Vec<(SheetId, u32, u32)> {
        (0..self.graph.sheets.len() as SheetId)
            .map(|id| {
                let (rows, cols) = self.graph.sheet_extent(id);
                (id, rows, cols)
            })
            .collect()
    }

    // ---- mutations ----------------------------------------------------------

    /// Ingests `text` at `address` per the standard grammar: `=...` is a
    /// formula, `{=...}` an array formula spread across `address` (which must
    /// then name a range), an empty string clears the cell, a numeric string
    /// becomes a number, anything else becomes text. Recomputes the affected
    /// closure before returning.
    pub fn set_cell_content(&mut self, sheet: SheetId, address: &str, text: &str) -> Result<(), EngineError> {
        let range = address_text::parse_range(sheet, address)?;
        match classify(text) {
            CellContent::ArrayFormula(formula) => {
                self.graph.set_matrix_formula(range, &formula, &*self.library)?;
            }
            other => {
                let cell = range
                    .is_single_cell()
                    .then(|| range.top_left())
                    .ok_or_else(|| EngineError::NotASingleCell(address.to_string()))?;
                match other {
                    CellContent::Empty => {
                        self.graph.set_cell_empty(cell)?;
                    }
                    CellContent::Formula(formula) => {
                        self.graph.set_formula_to_cell(cell, &formula, &*self.library)?;
                    }
                    CellContent::Number(n) => {
                        self.graph.set_value_to_cell(cell, LiteralValue::Number(n))?;
                    }
                    CellContent::Text(s) => {
                        self.graph.set_value_to_cell(cell, LiteralValue::Text(s))?;
                    }
                    CellContent::ArrayFormula(_) => unreachable!(),
                }
            }
        }
        self.recompute();
        Ok(())
    }

    /// Installs a rectangular block of numbers as a matrix vertex (not a
    /// formula); `values` must be non-empty and rectangular.
    pub fn set_matrix_values(&mut self, sheet: SheetId, address: &str, values: Vec<Vec<f64>>) -> Result<(), EngineError> {
        let range = address_text::parse_range(sheet, address)?;
        self.graph.set_matrix_numeric(range, values)?;
        self.recompute();
        Ok(())
    }

    pub fn add_rows(&mut self, sheet: SheetId, row_start: u32, count: u32) -> Result<(), EngineError> {
        self.graph.add_rows(sheet, row_start, count)?;
        self.recompute();
        Ok(())
    }

    pub fn remove_rows(&mut self, sheet: SheetId, row_start: u32, row_end: u32) -> Result<(), EngineError> {
        self.graph.remove_rows(sheet, row_start, row_end)?;
        self.recompute();
        Ok(())
    }

    pub fn add_columns(&mut self, sheet: SheetId, col_start: u32, count: u32) -> Result<(), EngineError> {
        self.graph.add_columns(sheet, col_start, count)?;
        self.recompute();
        Ok(())
    }

    pub fn remove_columns(&mut self, sheet: SheetId, col_start: u32, col_end: u32) -> Result<(), EngineError> {
        self.graph.remove_columns(sheet, col_start, col_end)?;
        self.recompute();
        Ok(())
    }

    /// Moves the block at `source` (on `sheet`) so its top-left lands at
    /// `dest` (on `dest_sheet`). `dest` may name a single cell (the new
    /// top-left) or a range matching `source`'s dimensions exactly.
    pub fn move_cells(
        &mut self,
        sheet: SheetId,
        source: &str,
        dest_sheet: SheetId,
        dest: &str,
    ) -> Result<(), EngineError> {
        let source_range = address_text::parse_range(sheet, source)?;
        let dest_range = address_text::parse_range(dest_sheet, dest)?;
        if !dest_range.is_single_cell()
            && (dest_range.width() != source_range.width() || dest_range.height() != source_range.height())
        {
            return Err(TransformError::SizeMismatch.into());
        }
        let d_row = dest_range.start.row() as i64 - source_range.start.row() as i64;
        let d_col = dest_range.start.col() as i64 - source_range.start.col() as i64;
        self.graph.move_cells(source_range, d_row, d_col, dest_sheet)?;
        self.recompute();
        Ok(())
    }

    /// Flushes any structural edits the lazy queue hasn't replayed onto a
    /// vertex yet by forcing a recompute; every mutator already recomputes
    /// immediately, so this exists for callers that batch several structural
    /// calls through lower-level access and want an explicit sync point.
    pub fn force_apply_postponed_transformations(&mut self) {
        self.recompute();
    }

    /// Disables automatic detection of adjacent numeric blocks as matrices.
    /// This engine never performs that detection in the first place
    /// (matrices are only created via [`Engine::set_matrix_values`] or an
    /// array formula through [`Engine::set_cell_content`]); this flips the
    /// config flag for API parity with hosts that probe it.
    pub fn disable_numeric_matrices(&mut self) {
        self.config.matrix_detection = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_cell_text() {
        assert_eq!(classify(""), CellContent::Empty);
        assert_eq!(classify("=A1+1"), CellContent::Formula("A1+1".to_string()));
        assert_eq!(classify("{=A1:A2}"), CellContent::ArrayFormula("A1:A2".to_string()));
        assert_eq!(classify("42"), CellContent::Number(42.0));
        assert_eq!(classify("hello"), CellContent::Text("hello".to_string()));
    }

    #[test]
    fn set_and_get_a_plain_value() {
        let mut e = Engine::default();
        let sheet = e.sheet_id("Sheet1");
        e.set_cell_content(sheet, "A1", "10").unwrap();
        assert_eq!(e.get_cell_value(sheet, "A1").unwrap(), LiteralValue::Number(10.0));
    }

    #[test]
    fn a_formula_recomputes_after_its_dependency_changes() {
        let mut e = Engine::default();
        let sheet = e.sheet_id("Sheet1");
        e.set_cell_content(sheet, "A1", "2").unwrap();
        e.set_cell_content(sheet, "A2", "=A1*10").unwrap();
        assert_eq!(e.get_cell_value(sheet, "A2").unwrap(), LiteralValue::Number(20.0));

        e.set_cell_content(sheet, "A1", "3").unwrap();
        assert_eq!(e.get_cell_value(sheet, "A2").unwrap(), LiteralValue::Number(30.0));
    }

    #[test]
    fn inserting_a_row_grows_a_sum_range() {
        let mut e = Engine::default();
        let sheet = e.sheet_id("Sheet1");
        e.set_cell_content(sheet, "A1", "1").unwrap();
        e.set_cell_content(sheet, "A2", "2").unwrap();
        e.set_cell_content(sheet, "A3", "=SUM(A1:A2)").unwrap();
        assert_eq!(e.get_cell_value(sheet, "A3").unwrap(), LiteralValue::Number(3.0));

        e.add_rows(sheet, 0, 1).unwrap();
        assert_eq!(e.get_cell_value(sheet, "A4").unwrap(), LiteralValue::Number(3.0));
    }

    #[test]
    fn moving_a_cell_relocates_its_value() {
        let mut e = Engine::default();
        let sheet = e.sheet_id("Sheet1");
        e.set_cell_content(sheet, "A1", "99").unwrap();
        e.move_cells(sheet, "A1", sheet, "B2").unwrap();
        assert_eq!(e.get_cell_value(sheet, "B2").unwrap(), LiteralValue::Number(99.0));
        assert_eq!(e.get_cell_value(sheet, "A1").unwrap(), LiteralValue::Empty);
    }

    #[test]
    fn from_sheet_data_ingests_a_grid() {
        let rows = vec![
            vec!["1".to_string(), "2".to_string()],
            vec!["=A1+B1".to_string(), String::new()],
        ];
        let e = Engine::from_sheet_data("Sheet1", &rows).unwrap();
        let sheet = e.resolve_sheet("Sheet1").unwrap();
        assert_eq!(e.get_cell_value(sheet, "A2").unwrap(), LiteralValue::Number(3.0));
    }

    #[test]
    fn configured_function_arg_separator_reaches_the_parser() {
        let mut e = Engine::new(EngineConfig::new().with_function_arg_separator(';'));
        let sheet = e.sheet_id("Sheet1");
        e.set_cell_content(sheet, "A1", "1").unwrap();
        e.set_cell_content(sheet, "A2", "2").unwrap();
        e.set_cell_content(sheet, "A3", "=SUM(A1;A2)").unwrap();
        assert_eq!(e.get_cell_value(sheet, "A3").unwrap(), LiteralValue::Number(3.0));
    }
}
