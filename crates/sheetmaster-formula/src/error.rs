//! Formula error types

use sheetmaster_core::CellError;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during formula parsing or evaluation
///
/// None of these abort a recompute: each is turned into a per-cell sentinel
/// with [`FormulaError::to_cell_error`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Formula evaluation error
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Reference that cannot be resolved (malformed range, bad address)
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Range larger than the configured ceiling
    #[error("Range {range} spans {cells} cells (limit: {limit})")]
    RangeTooLarge {
        range: String,
        cells: u64,
        limit: u64,
    },
}

impl FormulaError {
    /// The sentinel a cell shows for this error
    pub fn to_cell_error(&self) -> CellError {
        match self {
            FormulaError::InvalidReference(_) | FormulaError::RangeTooLarge { .. } => {
                CellError::Ref
            }
            FormulaError::Parse(_)
            | FormulaError::Evaluation(_)
            | FormulaError::UnknownFunction(_)
            | FormulaError::ArgumentCount { .. } => CellError::Generic,
        }
    }
}

impl From<sheetmaster_core::Error> for FormulaError {
    fn from(err: sheetmaster_core::Error) -> Self {
        match err {
            sheetmaster_core::Error::RangeTooLarge {
                range,
                cells,
                limit,
            } => FormulaError::RangeTooLarge {
                range,
                cells,
                limit,
            },
            other => FormulaError::InvalidReference(other.to_string()),
        }
    }
}
