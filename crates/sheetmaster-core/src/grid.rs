//! Sparse cell storage
//!
//! A [`Grid`] maps coordinates to [`Cell`]s. A missing key is an empty cell.
//! The grid keeps a row bound that can grow and a fixed column bound; writes
//! outside them are rejected rather than clamped.

use crate::cell::{CellAddress, ComputedValue};
use crate::error::{Error, Result};
use crate::style::CellStyle;
use crate::{DEFAULT_COLS, DEFAULT_ROWS, MAX_COLS, MAX_ROWS};
use std::collections::{BTreeMap, BTreeSet};

/// One cell: raw input, derived value, optional style
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    /// Raw input; a leading `=` marks a formula
    #[cfg_attr(feature = "serde", serde(default))]
    pub value: String,
    /// Value derived by the last recompute
    #[cfg_attr(feature = "serde", serde(default))]
    pub computed: ComputedValue,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub style: Option<CellStyle>,
}

impl Cell {
    /// Create a cell from raw input
    ///
    /// Literals get their coerced value immediately; formulas start out as
    /// empty text until the next recompute.
    pub fn new<S: Into<String>>(value: S) -> Self {
        let value = value.into();
        let computed = Self::initial_computed(&value);
        Self {
            value,
            computed,
            style: None,
        }
    }

    /// Attach a style
    pub fn with_style(mut self, style: CellStyle) -> Self {
        self.style = Some(style);
        self
    }

    fn initial_computed(value: &str) -> ComputedValue {
        if value.starts_with('=') {
            ComputedValue::default()
        } else {
            ComputedValue::from_literal(value)
        }
    }

    /// Check if the raw input is a formula
    pub fn is_formula(&self) -> bool {
        self.value.starts_with('=')
    }

    /// Formula text including the leading `=`, if this is a formula
    pub fn formula(&self) -> Option<&str> {
        self.is_formula().then_some(self.value.as_str())
    }

    /// Check if the cell carries a non-empty style
    pub fn has_style(&self) -> bool {
        self.style.as_ref().map_or(false, |s| !s.is_empty())
    }

    /// Empty value and empty style: indistinguishable from an absent cell
    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && !self.has_style()
    }

    /// Compare the user-entered parts (value and style), ignoring `computed`
    ///
    /// A missing style and an empty style are treated as the same thing.
    pub fn same_input(&self, other: &Cell) -> bool {
        if self.value != other.value {
            return false;
        }
        match (self.has_style(), other.has_style()) {
            (false, false) => true,
            (true, true) => self.style == other.style,
            _ => false,
        }
    }
}

/// Sparse grid of cells
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Grid {
    #[cfg_attr(feature = "serde", serde(rename = "data", with = "cell_map", default))]
    cells: BTreeMap<CellAddress, Cell>,
    #[cfg_attr(feature = "serde", serde(rename = "rowCount", default = "default_rows"))]
    row_count: u32,
    #[cfg_attr(feature = "serde", serde(rename = "colCount", default = "default_cols"))]
    col_count: u16,
}

#[cfg(feature = "serde")]
fn default_rows() -> u32 {
    DEFAULT_ROWS
}

#[cfg(feature = "serde")]
fn default_cols() -> u16 {
    DEFAULT_COLS
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl Grid {
    /// Create an empty grid with the default bounds
    pub fn new() -> Self {
        Self::with_size(DEFAULT_ROWS, DEFAULT_COLS)
    }

    /// Create an empty grid with explicit bounds
    pub fn with_size(rows: u32, cols: u16) -> Self {
        Self {
            cells: BTreeMap::new(),
            row_count: rows.min(MAX_ROWS),
            col_count: cols.min(MAX_COLS),
        }
    }

    /// Number of addressable rows
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    /// Number of addressable columns
    pub fn col_count(&self) -> u16 {
        self.col_count
    }

    /// Grow the row bound to at least `rows` (never shrinks)
    pub fn ensure_rows(&mut self, rows: u32) {
        self.row_count = self.row_count.max(rows.min(MAX_ROWS));
    }

    /// Check if an address lies inside the grid bounds
    pub fn in_bounds(&self, addr: CellAddress) -> bool {
        addr.row < self.row_count && addr.col < self.col_count
    }

    /// Check bounds, reporting which axis is out of range
    pub fn check_bounds(&self, addr: CellAddress) -> Result<()> {
        if addr.row >= self.row_count {
            return Err(Error::RowOutOfBounds(addr.row, self.row_count.saturating_sub(1)));
        }
        if addr.col >= self.col_count {
            return Err(Error::ColumnOutOfBounds(addr.col, self.col_count.saturating_sub(1)));
        }
        Ok(())
    }

    /// Get a cell
    pub fn get(&self, addr: CellAddress) -> Option<&Cell> {
        self.cells.get(&addr)
    }

    /// Raw input of a cell (`""` when absent)
    pub fn raw_value(&self, addr: CellAddress) -> &str {
        self.cells.get(&addr).map_or("", |c| c.value.as_str())
    }

    /// Computed value of a cell, if present
    pub fn computed(&self, addr: CellAddress) -> Option<&ComputedValue> {
        self.cells.get(&addr).map(|c| &c.computed)
    }

    /// Write raw input, keeping any existing style
    ///
    /// Writing an empty value to an unstyled cell removes it.
    pub fn set_value<S: Into<String>>(&mut self, addr: CellAddress, value: S) -> Result<()> {
        self.check_bounds(addr)?;
        let value = value.into();
        let style = self.cells.remove(&addr).and_then(|c| c.style);
        let mut cell = Cell::new(value);
        cell.style = style;
        if !cell.is_blank() {
            self.cells.insert(addr, cell);
        }
        Ok(())
    }

    /// Replace a cell's style, keeping its value
    pub fn set_style(&mut self, addr: CellAddress, style: Option<CellStyle>) -> Result<()> {
        self.check_bounds(addr)?;
        let mut cell = self.cells.remove(&addr).unwrap_or_default();
        cell.style = style;
        if !cell.is_blank() {
            self.cells.insert(addr, cell);
        }
        Ok(())
    }

    /// Insert a whole cell; blank cells remove the key instead
    pub fn insert(&mut self, addr: CellAddress, cell: Cell) -> Result<()> {
        self.check_bounds(addr)?;
        if cell.is_blank() {
            self.cells.remove(&addr);
        } else {
            self.cells.insert(addr, cell);
        }
        Ok(())
    }

    /// Remove a cell
    pub fn remove(&mut self, addr: CellAddress) -> Option<Cell> {
        self.cells.remove(&addr)
    }

    /// Store a derived value on an existing cell
    ///
    /// Returns `false` when no cell exists at `addr`.
    pub fn set_computed(&mut self, addr: CellAddress, value: ComputedValue) -> bool {
        match self.cells.get_mut(&addr) {
            Some(cell) => {
                cell.computed = value;
                true
            }
            None => false,
        }
    }

    /// Iterate over all stored cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (CellAddress, &Cell)> + '_ {
        self.cells.iter().map(|(addr, cell)| (*addr, cell))
    }

    /// Iterate over mutable cells in row-major order
    pub fn cells_mut(&mut self) -> impl Iterator<Item = (CellAddress, &mut Cell)> + '_ {
        self.cells.iter_mut().map(|(addr, cell)| (*addr, cell))
    }

    /// Iterate over formula cells and their text
    pub fn formula_cells(&self) -> impl Iterator<Item = (CellAddress, &str)> + '_ {
        self.cells
            .iter()
            .filter_map(|(addr, cell)| cell.formula().map(|f| (*addr, f)))
    }

    /// Number of stored cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if no cells are stored
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Drop cells whose value and style are both empty
    pub fn normalize(&mut self) {
        self.cells.retain(|_, cell| !cell.is_blank());
    }
}

/// One changed raw value between two grids
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueChange {
    pub address: CellAddress,
    pub before: String,
    pub after: String,
}

/// List every coordinate whose raw value differs, sorted by row then column
pub fn diff_values(before: &Grid, after: &Grid) -> Vec<ValueChange> {
    let keys: BTreeSet<CellAddress> = before
        .cells
        .keys()
        .chain(after.cells.keys())
        .copied()
        .collect();

    keys.into_iter()
        .filter_map(|address| {
            let old = before.raw_value(address);
            let new = after.raw_value(address);
            (old != new).then(|| ValueChange {
                address,
                before: old.to_string(),
                after: new.to_string(),
            })
        })
        .collect()
}

#[cfg(feature = "serde")]
mod cell_map {
    use super::{Cell, CellAddress};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        cells: &BTreeMap<CellAddress, Cell>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(cells.iter().map(|(addr, cell)| (addr.to_key(), cell)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<CellAddress, Cell>, D::Error> {
        let raw: BTreeMap<String, Cell> = BTreeMap::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, cell)| {
                CellAddress::from_key(&key, ',')
                    .map(|addr| (addr, cell))
                    .ok_or_else(|| D::Error::custom(format!("invalid cell key '{}'", key)))
            })
            .collect()
    }
}
