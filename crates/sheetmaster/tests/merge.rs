//! Tests for three-way merge and the branch workflow

use pretty_assertions::assert_eq;
use sheetmaster::prelude::*;
use sheetmaster::{CellStyle, MergedRegion};
use std::collections::BTreeMap;

fn a(label: &str) -> CellAddress {
    CellAddress::parse(label).unwrap()
}

fn sheet(cells: &[(&str, &str)]) -> SheetState {
    let mut state = SheetState::new();
    for (label, value) in cells {
        state.grid.set_value(a(label), *value).unwrap();
    }
    state
}

/// Main changed, branch did not: main wins without conflict
#[test]
fn test_main_only_change() {
    let result = prepare_merge(&sheet(&[("A1", "1")]), &sheet(&[("A1", "2")]), &sheet(&[("A1", "1")])).unwrap();
    assert_eq!(result.merged.grid.raw_value(a("A1")), "2");
    assert!(result.conflicts.is_empty());
}

/// Both changed to different values: one conflict with all three raw values
#[test]
fn test_divergent_change() {
    let result = prepare_merge(&sheet(&[("A1", "1")]), &sheet(&[("A1", "2")]), &sheet(&[("A1", "3")])).unwrap();
    assert_eq!(result.conflicts.len(), 1);

    let conflict = &result.conflicts[0];
    assert_eq!(conflict.address, a("A1"));
    assert_eq!(conflict.base, "1");
    assert_eq!(conflict.main, "2");
    assert_eq!(conflict.branch, "3");
}

/// A full round: branch edits, conflicting picks, metadata and recompute
#[test]
fn test_merge_round_trip_through_store() {
    let mut main = sheet(&[("A1", "10"), ("A2", "20"), ("A3", "=A1+A2")]);
    main.column_widths.insert(0, 120.0);

    let mut store = BranchStore::new();
    let id = store.create("scenario", &main).unwrap().id.clone();

    let mut branch = store.get(&id).unwrap().state.clone();
    branch.grid.set_value(a("A1"), "11").unwrap();
    branch.grid.set_value(a("A2"), "25").unwrap();
    branch.grid.set_style(a("A3"), Some(CellStyle::new().bold(true))).unwrap();
    branch.merged_cells.push(MergedRegion::from(CellRange::parse("C1:D2").unwrap()));
    store.update_state(&id, branch).unwrap();

    // Main moves on meanwhile
    main.grid.set_value(a("A2"), "30").unwrap();
    main.column_widths.insert(1, 80.0);

    let preview = store.prepare_merge(&id, &main).unwrap();
    assert_eq!(preview.applied, 2);
    assert_eq!(preview.applied_meta, 1);
    assert_eq!(preview.conflicts.len(), 1);
    assert_eq!(preview.conflicts[0].id, "1,0");

    let picks = BTreeMap::from([("1,0".to_string(), ConflictPick::Branch)]);
    let merged = store.merge_into(&id, &main, &picks, &Recomputer::default()).unwrap();

    assert_eq!(merged.grid.raw_value(a("A1")), "11");
    assert_eq!(merged.grid.raw_value(a("A2")), "25");
    assert_eq!(merged.grid.computed(a("A3")), Some(&ComputedValue::Number(36.0)));
    assert!(merged.grid.get(a("A3")).unwrap().has_style());
    assert_eq!(merged.column_widths.get(&1), Some(&80.0));
    assert_eq!(merged.merged_cells.len(), 1);
    assert!(store.is_empty());
}

/// Unpicked conflicts keep main
#[test]
fn test_unpicked_conflict_keeps_main() {
    let result = prepare_merge(&sheet(&[("B2", "x")]), &sheet(&[("B2", "y")]), &sheet(&[("B2", "z")])).unwrap();
    let merged = apply_merge(result, &BTreeMap::new(), &Recomputer::default()).unwrap();
    assert_eq!(merged.grid.raw_value(a("B2")), "y");
    assert_eq!(merged.grid.computed(a("B2")), Some(&ComputedValue::Text("y".into())));
}

/// Merge results serialize with the public field names
#[test]
fn test_merge_result_json_shape() {
    let result = prepare_merge(&sheet(&[("A1", "1")]), &sheet(&[("A1", "2")]), &sheet(&[("A1", "3")])).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["appliedCount"], 0);
    assert_eq!(json["appliedMetaCount"], 0);
    assert_eq!(json["conflicts"][0]["id"], "0,0");
    assert_eq!(json["conflicts"][0]["branch"], "3");
    assert!(json["conflicts"][0].get("branch_cell").is_none());
}
