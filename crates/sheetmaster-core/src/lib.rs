//! # sheetmaster-core
//!
//! Core data structures for the sheetmaster spreadsheet engine.
//!
//! This crate provides the fundamental types used throughout sheetmaster:
//! - [`CellAddress`] and [`CellRange`] - A1 addressing and range expansion
//! - [`ComputedValue`] and [`CellError`] - Derived cell values and error sentinels
//! - [`Grid`] and [`Cell`] - The sparse cell store
//! - [`SheetState`] - A grid plus the layout metadata carried through merges
//!
//! ## Example
//!
//! ```rust
//! use sheetmaster_core::{CellAddress, Grid};
//!
//! let mut grid = Grid::new();
//! let a1 = CellAddress::from_label("A1").unwrap();
//! grid.set_value(a1, "5").unwrap();
//!
//! assert_eq!(grid.raw_value(a1), "5");
//! ```

pub mod cell;
pub mod error;
pub mod grid;
pub mod sheet;
pub mod style;

// Re-exports for convenience
pub use cell::{format_number, parse_number, CellAddress, CellError, CellRange, ComputedValue};
pub use error::{Error, Result};
pub use grid::{diff_values, Cell, Grid, ValueChange};
pub use sheet::{FreezePosition, MergedRegion, Selection, SheetState};
pub use style::{BorderLineStyle, Borders, CellStyle, NumberFormatKind, TextAlign, VerticalAlign, WrapMode};

/// Maximum number of addressable rows
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of addressable columns
pub const MAX_COLS: u16 = 16_384;

/// Default number of rows in a new grid
pub const DEFAULT_ROWS: u32 = 100;

/// Default number of columns in a new grid (A..AZ)
pub const DEFAULT_COLS: u16 = 52;
