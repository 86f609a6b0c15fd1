//! Three-way merge of sheet states
//!
//! A branch is merged back into main against the state the branch started
//! from (its base). Cells are compared on their user-entered parts only;
//! computed values are regenerated once the merge is applied.
//!
//! Per cell, with empty cells treated as absent:
//! - main and branch agree: keep main
//! - only branch changed: take branch (counted in `applied`)
//! - only main changed: keep main
//! - both changed differently: report a [`MergeConflict`]
//!
//! Layout metadata follows the same rule, per key for column widths and row
//! heights and wholesale for the freeze position and merged regions. Metadata
//! never conflicts; when both sides changed, main wins.

use crate::calculation::Recomputer;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sheetmaster_core::{Cell, CellAddress, Grid, SheetState};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A cell both sides changed to different contents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeConflict {
    /// Conflict id, `"row,col"`
    pub id: String,
    pub address: CellAddress,
    /// Raw values; `""` when the cell is absent
    pub base: String,
    pub main: String,
    pub branch: String,
    #[serde(skip)]
    main_cell: Option<Cell>,
    #[serde(skip)]
    branch_cell: Option<Cell>,
}

/// Which side resolves a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPick {
    Main,
    Branch,
}

impl FromStr for ConflictPick {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(ConflictPick::Main),
            "branch" => Ok(ConflictPick::Branch),
            _ => Err(Error::InvalidPick(s.to_string())),
        }
    }
}

impl fmt::Display for ConflictPick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPick::Main => write!(f, "main"),
            ConflictPick::Branch => write!(f, "branch"),
        }
    }
}

/// Outcome of [`prepare_merge`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// Merged state with every conflict still holding main's cell
    pub merged: SheetState,
    pub conflicts: Vec<MergeConflict>,
    /// Cells taken from the branch
    #[serde(rename = "appliedCount")]
    pub applied: usize,
    /// Metadata entries taken from the branch
    #[serde(rename = "appliedMetaCount")]
    pub applied_meta: usize,
}

impl MergeResult {
    /// Check if the merge needs no conflict resolution
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Look up a conflict by id
    pub fn conflict(&self, id: &str) -> Option<&MergeConflict> {
        self.conflicts.iter().find(|c| c.id == id)
    }
}

/// A cell that is not blank, or `None`
fn present(grid: &Grid, addr: CellAddress) -> Option<&Cell> {
    grid.get(addr).filter(|cell| !cell.is_blank())
}

fn same(a: Option<&Cell>, b: Option<&Cell>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_input(b),
        _ => false,
    }
}

fn raw(cell: Option<&Cell>) -> String {
    cell.map(|c| c.value.clone()).unwrap_or_default()
}

/// Write `cell` (or clear the coordinate) in `grid`
fn put(grid: &mut Grid, addr: CellAddress, cell: Option<Cell>) -> Result<()> {
    match cell {
        Some(cell) => grid.insert(addr, cell)?,
        None => {
            grid.remove(addr);
        }
    }
    Ok(())
}

/// Branch's value when only the branch changed it
fn fast_forward<T: PartialEq + Clone>(base: &T, main: &T, branch: &T) -> Option<T> {
    (main != branch && main == base).then(|| branch.clone())
}

/// Per-key three-way merge of a numeric map into `merged`
fn merge_map<K: Ord + Copy>(
    base: &BTreeMap<K, f64>,
    main: &BTreeMap<K, f64>,
    branch: &BTreeMap<K, f64>,
    merged: &mut BTreeMap<K, f64>,
) -> usize {
    let keys: BTreeSet<K> = base.keys().chain(main.keys()).chain(branch.keys()).copied().collect();
    let mut applied = 0;
    for key in keys {
        let value = fast_forward(&base.get(&key), &main.get(&key), &branch.get(&key));
        if let Some(value) = value {
            match value {
                Some(v) => merged.insert(key, *v),
                None => merged.remove(&key),
            };
            applied += 1;
        }
    }
    applied
}

fn merge_metadata(base: &SheetState, main: &SheetState, branch: &SheetState, merged: &mut SheetState) -> usize {
    let mut applied = merge_map(&base.column_widths, &main.column_widths, &branch.column_widths, &mut merged.column_widths);
    applied += merge_map(&base.row_heights, &main.row_heights, &branch.row_heights, &mut merged.row_heights);

    if let Some(freeze) = fast_forward(&base.freeze_position, &main.freeze_position, &branch.freeze_position) {
        merged.freeze_position = freeze;
        applied += 1;
    }
    if let Some(regions) = fast_forward(&base.merged_cells, &main.merged_cells, &branch.merged_cells) {
        merged.merged_cells = regions;
        applied += 1;
    }
    applied
}

/// Merge `branch` into `main` against their common ancestor `base`
///
/// Conflicting cells keep main's contents in `merged` until resolved with
/// [`apply_merge`].
pub fn prepare_merge(base: &SheetState, main: &SheetState, branch: &SheetState) -> Result<MergeResult> {
    let mut merged = main.clone();
    let rows = base.row_count().max(main.row_count()).max(branch.row_count());
    merged.grid.ensure_rows(rows);

    let keys: BTreeSet<CellAddress> = base
        .grid
        .cells()
        .chain(main.grid.cells())
        .chain(branch.grid.cells())
        .map(|(addr, _)| addr)
        .collect();

    let mut conflicts = Vec::new();
    let mut applied = 0;

    for addr in keys {
        let b = present(&base.grid, addr);
        let m = present(&main.grid, addr);
        let br = present(&branch.grid, addr);

        if same(m, br) || same(br, b) {
            continue;
        }
        if same(m, b) {
            put(&mut merged.grid, addr, br.cloned())?;
            applied += 1;
            continue;
        }
        conflicts.push(MergeConflict {
            id: addr.to_key(),
            address: addr,
            base: raw(b),
            main: raw(m),
            branch: raw(br),
            main_cell: m.cloned(),
            branch_cell: br.cloned(),
        });
    }

    let applied_meta = merge_metadata(base, main, branch, &mut merged);
    merged.grid.normalize();

    debug!(
        applied,
        applied_meta,
        conflicts = conflicts.len(),
        "merge prepared"
    );

    Ok(MergeResult {
        merged,
        conflicts,
        applied,
        applied_meta,
    })
}

/// Resolve conflicts and recompute the merged state with `recomputer`
///
/// Conflicts missing from `picks` keep main's contents. A pick naming an
/// unknown conflict id is an error.
pub fn apply_merge(
    result: MergeResult,
    picks: &BTreeMap<String, ConflictPick>,
    recomputer: &Recomputer,
) -> Result<SheetState> {
    if let Some(id) = picks.keys().find(|id| result.conflict(id).is_none()) {
        return Err(Error::UnknownConflict(id.clone()));
    }

    let MergeResult {
        mut merged,
        conflicts,
        ..
    } = result;

    for conflict in conflicts {
        let cell = match picks.get(&conflict.id) {
            Some(ConflictPick::Branch) => conflict.branch_cell,
            Some(ConflictPick::Main) | None => conflict.main_cell,
        };
        put(&mut merged.grid, conflict.address, cell)?;
    }

    let (grid, stats) = recomputer.recompute(&merged.grid);
    debug!(calculated = stats.cells_calculated, "merged state recomputed");
    merged.grid = grid;
    Ok(merged)
}
