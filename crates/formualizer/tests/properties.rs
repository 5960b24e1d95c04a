use formualizer::Engine;
use formualizer_common::LiteralValue;
use proptest::prelude::*;

fn grid_strategy() -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-1000.0..1000.0f64, 1..5), 1..6)
}

proptest! {
    /// add_rows(r, 1) immediately followed by remove_rows(r, r) is a net
    /// no-op in row space: every surviving cell's value is unchanged.
    #[test]
    fn add_then_remove_one_row_commutes_to_identity(grid in grid_strategy(), at in 0u32..5) {
        let mut e = Engine::default();
        let sheet = e.sheet_id("Sheet1");
        let width = grid[0].len();
        for (row_idx, row) in grid.iter().enumerate() {
            for col_idx in 0..width {
                let letter = formualizer_common::RelativeCoord::col_to_letters(col_idx as u32);
                let addr = format!("{letter}{}", row_idx + 1);
                e.set_cell_content(sheet, &addr, &row[col_idx].to_string()).unwrap();
            }
        }
        let row_start = at.min(grid.len() as u32);
        let before = e.get_values(sheet);

        e.add_rows(sheet, row_start, 1).unwrap();
        e.remove_rows(sheet, row_start, row_start).unwrap();

        let after = e.get_values(sheet);
        prop_assert_eq!(before, after);
    }

    /// SUM over a full rectangular numeric block equals the arithmetic sum
    /// of every cell, regardless of grid shape.
    #[test]
    fn sum_over_a_block_matches_its_arithmetic_total(grid in grid_strategy()) {
        let mut e = Engine::default();
        let sheet = e.sheet_id("Sheet1");
        let width = grid[0].len();
        let height = grid.len();
        let mut total = 0.0;
        for (row_idx, row) in grid.iter().enumerate() {
            for col_idx in 0..width {
                let letter = formualizer_common::RelativeCoord::col_to_letters(col_idx as u32);
                let addr = format!("{letter}{}", row_idx + 1);
                e.set_cell_content(sheet, &addr, &row[col_idx].to_string()).unwrap();
                total += row[col_idx];
            }
        }
        let last_col = formualizer_common::RelativeCoord::col_to_letters(width as u32);
        let formula_addr = format!("{last_col}1");
        let range = format!(
            "A1:{}{}",
            formualizer_common::RelativeCoord::col_to_letters(width as u32 - 1),
            height
        );
        e.set_cell_content(sheet, &formula_addr, &format!("=SUM({range})")).unwrap();

        match e.get_cell_value(sheet, &formula_addr).unwrap() {
            LiteralValue::Number(n) => prop_assert!((n - total).abs() < 1e-6),
            other => prop_assert!(false, "expected a number, got {other:?}"),
        }
    }
}
