//! # sheetmaster
//!
//! A spreadsheet engine for sheets kept in memory by a single owner.
//!
//! Sheetmaster regenerates every derived value of a sheet from its raw inputs
//! and reconciles divergent copies of a sheet.
//!
//! ## Features
//!
//! - Full and incremental recompute with cycle detection
//! - Formula evaluation with a spreadsheet-style function catalog
//! - Three-way merge of a branch back into main, with conflict picks
//! - A bounded branch store
//! - A single-writer queue that batches remote edits
//!
//! ## Example
//!
//! ```rust
//! use sheetmaster::prelude::*;
//!
//! let mut base = SheetState::new();
//! base.grid.set_value(CellAddress::new(0, 0), "1").unwrap();
//! base.grid.set_value(CellAddress::new(0, 1), "=A1*2").unwrap();
//!
//! let mut store = BranchStore::new();
//! let id = store.create("double", &base).unwrap().id.clone();
//!
//! let mut edited = base.clone();
//! edited.grid.set_value(CellAddress::new(0, 0), "21").unwrap();
//! store.update_state(&id, edited).unwrap();
//!
//! let merged = store
//!     .merge_into(&id, &base, &Default::default(), &Recomputer::default())
//!     .unwrap();
//! assert_eq!(
//!     merged.grid.computed(CellAddress::new(0, 1)),
//!     Some(&ComputedValue::Number(42.0))
//! );
//! ```

pub mod branch;
pub mod calculation;
pub mod error;
pub mod merge;
pub mod prelude;
pub mod realtime;

pub use branch::{Branch, BranchStore, DEFAULT_BRANCH_LIMIT};
pub use calculation::{recompute, RecomputeMode, RecomputeOptions, RecomputeStats, Recomputer};
pub use error::{Error, Result};
pub use merge::{apply_merge, prepare_merge, ConflictPick, MergeConflict, MergeResult};
pub use realtime::{grid_from_crdt, BatchReport, EditQueue, EditSender, RemoteEdit};

// Re-export core types
pub use sheetmaster_core::{
    diff_values,
    Cell,
    CellAddress,
    CellError,
    CellRange,
    CellStyle,
    ComputedValue,
    FreezePosition,
    Grid,
    MergedRegion,
    Selection,
    SheetState,
    ValueChange,
};

// Re-export formula entry points
pub use sheetmaster_formula::{evaluate_formula, parse_formula, DependencyGraph, EvaluationContext};
