//! Prelude module - common imports for sheetmaster users
//!
//! ```rust
//! use sheetmaster::prelude::*;
//! ```

pub use crate::{
    // Merge and branches
    apply_merge,
    prepare_merge,
    Branch,
    BranchStore,
    ConflictPick,
    MergeResult,

    // Cell types
    CellAddress,
    CellError,
    CellRange,
    ComputedValue,
    Grid,
    SheetState,

    // Recompute
    recompute,
    RecomputeMode,
    RecomputeOptions,
    Recomputer,

    // Remote edits
    EditQueue,
    RemoteEdit,

    // Error types
    Error,
    Result,
};
