//! Sheet state: a grid plus view and layout metadata
//!
//! Only the grid (and its row bound) takes part in computation. Everything else
//! is carried through merges and persisted as-is.

use crate::cell::{CellAddress, CellRange};
use crate::grid::Grid;
use std::collections::BTreeMap;

/// Selected rectangle, anchored where the selection started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Selection {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl Selection {
    /// The normalized range covered by the selection
    pub fn range(&self) -> CellRange {
        CellRange::new(self.start, self.end)
    }
}

/// Frozen header rows and columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FreezePosition {
    pub rows: u32,
    pub cols: u16,
}

/// A merged-cell rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MergedRegion {
    pub start_row: u32,
    pub start_col: u16,
    pub end_row: u32,
    pub end_col: u16,
}

impl MergedRegion {
    /// The normalized range covered by the region
    pub fn range(&self) -> CellRange {
        CellRange::from_indices(self.start_row, self.start_col, self.end_row, self.end_col)
    }
}

impl From<CellRange> for MergedRegion {
    fn from(range: CellRange) -> Self {
        Self {
            start_row: range.start.row,
            start_col: range.start.col,
            end_row: range.end.row,
            end_col: range.end.col,
        }
    }
}

/// Complete state of one sheet
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct SheetState {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub grid: Grid,
    pub active_cell: Option<CellAddress>,
    pub selection: Option<Selection>,
    pub column_widths: BTreeMap<u16, f64>,
    pub row_heights: BTreeMap<u32, f64>,
    pub freeze_position: Option<FreezePosition>,
    pub merged_cells: Vec<MergedRegion>,
}

impl SheetState {
    /// Create an empty sheet with default bounds
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing grid with empty metadata
    pub fn from_grid(grid: Grid) -> Self {
        Self {
            grid,
            ..Default::default()
        }
    }

    /// Number of addressable rows
    pub fn row_count(&self) -> u32 {
        self.grid.row_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_region_range() {
        let region = MergedRegion {
            start_row: 3,
            start_col: 2,
            end_row: 1,
            end_col: 0,
        };
        let range = region.range();
        assert_eq!(range.start, CellAddress::new(1, 0));
        assert_eq!(range.end, CellAddress::new(3, 2));
        assert_eq!(MergedRegion::from(range).range(), range);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_sheet_json_is_flat() {
        let mut sheet = SheetState::new();
        sheet.grid.set_value(CellAddress::new(0, 0), "1").unwrap();
        sheet.column_widths.insert(0, 120.0);
        sheet.freeze_position = Some(FreezePosition { rows: 1, cols: 0 });

        let json = serde_json::to_value(&sheet).unwrap();
        assert_eq!(json["data"]["0,0"]["value"], "1");
        assert_eq!(json["rowCount"], 100);
        assert_eq!(json["columnWidths"]["0"], 120.0);
        assert_eq!(json["freezePosition"]["rows"], 1);

        let back: SheetState = serde_json::from_value(json).unwrap();
        assert_eq!(back, sheet);
    }
}
