//! Error types for the sheetmaster facade

use sheetmaster_formula::FormulaError;
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by merge, branch and edit operations
///
/// Formula problems are not reported here; recompute turns them into per-cell
/// sentinels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Grid or address error
    #[error(transparent)]
    Core(#[from] sheetmaster_core::Error),

    /// Formula error surfaced outside a recompute
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// No branch with this id
    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    /// The store cannot hold any branch
    #[error("Branch limit reached (limit: {0})")]
    BranchLimit(usize),

    /// A conflict pick names a conflict that does not exist
    #[error("Unknown conflict: {0}")]
    UnknownConflict(String),

    /// A conflict pick is neither `main` nor `branch`
    #[error("Invalid conflict pick: {0}")]
    InvalidPick(String),
}
