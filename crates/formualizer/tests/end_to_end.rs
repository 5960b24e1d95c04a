use formualizer::Engine;
use formualizer_common::LiteralValue;

fn num(n: f64) -> LiteralValue {
    LiteralValue::Number(n)
}

#[test]
fn a_formula_reads_a_literal_neighbor() {
    let rows = vec![vec!["42".to_string(), "=A1+2".to_string()]];
    let e = Engine::from_sheet_data("Sheet1", &rows).unwrap();
    let sheet = e.resolve_sheet("Sheet1").unwrap();
    assert_eq!(e.get_cell_value(sheet, "A1").unwrap(), num(42.0));
    assert_eq!(e.get_cell_value(sheet, "B1").unwrap(), num(44.0));
}

#[test]
fn a_sum_over_two_rows_recomputes_only_its_own_column() {
    let rows = vec![
        vec!["1".to_string(), "2".to_string(), "=A1+B1".to_string()],
        vec!["3".to_string(), "4".to_string(), "=A2+B2".to_string()],
        vec![String::new(), String::new(), "=SUM(A1:B2)".to_string()],
    ];
    let mut e = Engine::from_sheet_data("Sheet1", &rows).unwrap();
    let sheet = e.resolve_sheet("Sheet1").unwrap();
    assert_eq!(e.get_cell_value(sheet, "C1").unwrap(), num(3.0));
    assert_eq!(e.get_cell_value(sheet, "C2").unwrap(), num(7.0));
    assert_eq!(e.get_cell_value(sheet, "C3").unwrap(), num(10.0));

    e.set_cell_content(sheet, "A1", "10").unwrap();
    assert_eq!(e.get_cell_value(sheet, "C1").unwrap(), num(12.0));
    assert_eq!(e.get_cell_value(sheet, "C3").unwrap(), num(19.0));
    assert_eq!(e.get_cell_value(sheet, "C2").unwrap(), num(7.0));
}

#[test]
fn removing_the_referenced_column_turns_a_reference_into_a_ref_error() {
    let rows = vec![vec!["=B1".to_string(), "=C1".to_string(), "5".to_string()]];
    let mut e = Engine::from_sheet_data("Sheet1", &rows).unwrap();
    let sheet = e.resolve_sheet("Sheet1").unwrap();
    assert_eq!(e.get_cell_value(sheet, "A1").unwrap(), num(5.0));
    assert_eq!(e.get_cell_value(sheet, "C1").unwrap(), num(5.0));

    e.remove_columns(sheet, 1, 1).unwrap();
    assert!(e.get_cell_value(sheet, "A1").unwrap().is_error());
}

#[test]
fn inserting_a_row_above_a_sum_grows_it_in_place() {
    let rows = vec![
        vec!["1".to_string()],
        vec!["2".to_string()],
        vec!["=SUM(A1:A2)".to_string()],
    ];
    let mut e = Engine::from_sheet_data("Sheet1", &rows).unwrap();
    let sheet = e.resolve_sheet("Sheet1").unwrap();
    assert_eq!(e.get_cell_value(sheet, "A3").unwrap(), num(3.0));

    e.add_rows(sheet, 1, 1).unwrap();
    assert_eq!(e.get_cell_value(sheet, "A4").unwrap(), num(3.0));

    e.set_cell_content(sheet, "A2", "10").unwrap();
    assert_eq!(e.get_cell_value(sheet, "A4").unwrap(), num(13.0));
}

#[test]
fn a_row_removal_that_would_split_a_matrix_is_rejected_and_leaves_state_untouched() {
    let mut e = Engine::default();
    let sheet = e.sheet_id("Sheet1");
    e.set_matrix_values(sheet, "E1:F2", vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();

    let before = e.get_values(sheet);
    assert!(e.remove_rows(sheet, 0, 0).is_err());
    assert_eq!(e.get_values(sheet), before);
}

#[test]
fn a_two_cell_cycle_resolves_to_cycle_errors() {
    let rows = vec![vec!["=A2".to_string()], vec!["=A1".to_string()]];
    let e = Engine::from_sheet_data("Sheet1", &rows).unwrap();
    let sheet = e.resolve_sheet("Sheet1").unwrap();
    assert!(e.get_cell_value(sheet, "A1").unwrap().is_error());
    assert!(e.get_cell_value(sheet, "A2").unwrap().is_error());
}

#[test]
fn clearing_the_dirty_set_twice_in_a_row_is_not_an_error() {
    let mut e = Engine::default();
    let sheet = e.sheet_id("Sheet1");
    e.set_cell_content(sheet, "A1", "1").unwrap();
    e.force_apply_postponed_transformations();
    e.force_apply_postponed_transformations();
    assert_eq!(e.get_cell_value(sheet, "A1").unwrap(), num(1.0));
}
