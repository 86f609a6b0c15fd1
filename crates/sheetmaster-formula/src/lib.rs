//! # sheetmaster-formula
//!
//! Formula parser and evaluator for sheetmaster.
//!
//! This crate provides:
//! - Formula parsing (text → AST)
//! - Formula evaluation (AST → value) against a [`sheetmaster_core::Grid`]
//! - The built-in function catalog
//! - Dependency graphs, cycle detection and evaluation ordering
//!
//! ## Example
//!
//! ```rust
//! use sheetmaster_core::{CellAddress, ComputedValue, Grid};
//! use sheetmaster_formula::{evaluate_formula, EvaluationContext};
//!
//! let mut grid = Grid::new();
//! grid.set_value(CellAddress::new(0, 0), "4").unwrap();
//!
//! let ctx = EvaluationContext::new(&grid);
//! assert_eq!(evaluate_formula("=SQRT(A1)+1", &ctx), ComputedValue::Number(3.0));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;

pub use ast::{BinaryOperator, FormulaExpr, UnaryOperator};
pub use dependency::{formula_references, DependencyGraph, FormulaReferences};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{
    compare_values, evaluate, evaluate_formula, function_registry, EvaluationContext,
    FormulaValue, DEFAULT_MAX_RANGE_CELLS,
};
pub use functions::FunctionRegistry;
pub use parser::{parse_formula, MAX_NESTING_DEPTH};
