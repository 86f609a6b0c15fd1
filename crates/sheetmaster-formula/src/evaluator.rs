//! Formula evaluator
//!
//! Evaluates formula ASTs against a [`Grid`] to produce values. Cells are read
//! through their already-computed value, so the caller is responsible for
//! evaluating precedents first.

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use crate::parser::parse_formula;
use sheetmaster_core::{format_number, parse_number, CellAddress, CellError, CellRange, ComputedValue, Grid};
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Default ceiling on the number of cells a single range may expand to
pub const DEFAULT_MAX_RANGE_CELLS: u64 = 100_000;

/// Global function registry (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

/// The shared registry of built-in functions
pub fn function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    Array(Vec<Vec<FormulaValue>>),
    Empty,
}

impl FormulaValue {
    /// Convert to number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::String(s) => parse_number(s),
            FormulaValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Force conversion to number for arithmetic
    pub fn to_number(&self) -> FormulaResult<f64> {
        self.as_number()
            .ok_or_else(|| FormulaError::Evaluation(format!("Cannot convert {:?} to number", self)))
    }

    /// Convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::Empty => Some(false),
            FormulaValue::String(s) => {
                let upper = s.trim().to_uppercase();
                if upper == "TRUE" {
                    Some(true)
                } else if upper == "FALSE" {
                    Some(false)
                } else {
                    parse_number(s).map(|n| n != 0.0)
                }
            }
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(_) => CellError::Value.to_string(),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Get the error if this is one
    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// True for an empty cell or empty text
    pub fn is_blank(&self) -> bool {
        match self {
            FormulaValue::Empty => true,
            FormulaValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Convert a final formula result into what the cell stores
    pub fn into_computed(self) -> ComputedValue {
        match self {
            FormulaValue::Number(n) if n.is_finite() => ComputedValue::Number(n),
            FormulaValue::Number(_) => ComputedValue::Error(CellError::Num),
            FormulaValue::String(s) => ComputedValue::Text(s),
            FormulaValue::Boolean(b) => ComputedValue::Boolean(b),
            FormulaValue::Error(e) => ComputedValue::Error(e),
            FormulaValue::Array(_) => ComputedValue::Error(CellError::Value),
            FormulaValue::Empty => ComputedValue::Number(0.0),
        }
    }
}

impl From<&ComputedValue> for FormulaValue {
    fn from(value: &ComputedValue) -> Self {
        match value {
            ComputedValue::Number(n) => FormulaValue::Number(*n),
            ComputedValue::Text(s) if s.is_empty() => FormulaValue::Empty,
            ComputedValue::Text(s) => FormulaValue::String(s.clone()),
            ComputedValue::Boolean(b) => FormulaValue::Boolean(*b),
            ComputedValue::Error(e) => FormulaValue::Error(*e),
        }
    }
}

/// Context for formula evaluation
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Grid that references resolve against
    pub grid: Option<&'a Grid>,
    /// Largest number of cells one range may expand to
    pub max_range_cells: u64,
}

impl<'a> EvaluationContext<'a> {
    /// Create a context reading from `grid`
    pub fn new(grid: &'a Grid) -> Self {
        Self {
            grid: Some(grid),
            max_range_cells: DEFAULT_MAX_RANGE_CELLS,
        }
    }

    /// Create a simple context without a grid (for testing)
    ///
    /// Every reference resolves to an empty value.
    pub fn simple() -> Self {
        Self {
            grid: None,
            max_range_cells: DEFAULT_MAX_RANGE_CELLS,
        }
    }

    /// Override the range ceiling
    pub fn with_max_range_cells(mut self, limit: u64) -> Self {
        self.max_range_cells = limit;
        self
    }

    /// Get a cell value from the grid
    pub fn get_cell_value(&self, addr: CellAddress) -> FormulaValue {
        let grid = match self.grid {
            Some(grid) => grid,
            None => return FormulaValue::Empty,
        };

        if !grid.in_bounds(addr) {
            return FormulaValue::Error(CellError::Ref);
        }

        grid.computed(addr).map_or(FormulaValue::Empty, FormulaValue::from)
    }

    /// Get a range of cell values as a row-major array
    pub fn get_range_values(&self, range: &CellRange) -> FormulaResult<FormulaValue> {
        let cells = range.expand(self.max_range_cells).map_err(|err| {
            tracing::warn!(range = %range, limit = self.max_range_cells, "range exceeds cell ceiling");
            FormulaError::from(err)
        })?;

        if let Some(grid) = self.grid {
            if !grid.in_bounds(range.end) {
                return Ok(FormulaValue::Error(CellError::Ref));
            }
        }

        let width = range.col_count() as usize;
        let mut rows = Vec::with_capacity(range.row_count() as usize);
        let mut row = Vec::with_capacity(width);
        for addr in cells {
            row.push(self.get_cell_value(addr));
            if row.len() == width {
                rows.push(std::mem::replace(&mut row, Vec::with_capacity(width)));
            }
        }

        Ok(FormulaValue::Array(rows))
    }
}

/// Parse and evaluate formula text, folding every failure into a sentinel
///
/// ```rust
/// use sheetmaster_core::{CellAddress, ComputedValue, Grid};
/// use sheetmaster_formula::{evaluate_formula, EvaluationContext};
///
/// let mut grid = Grid::new();
/// grid.set_value(CellAddress::new(0, 0), "5").unwrap();
/// let ctx = EvaluationContext::new(&grid);
/// assert_eq!(evaluate_formula("=A1*2", &ctx), ComputedValue::Number(10.0));
/// ```
pub fn evaluate_formula(formula: &str, ctx: &EvaluationContext) -> ComputedValue {
    let result = parse_formula(formula).and_then(|ast| evaluate(&ast, ctx));
    match result {
        Ok(value) => value.into_computed(),
        Err(err) => {
            tracing::trace!(formula, error = %err, "formula failed");
            ComputedValue::Error(err.to_cell_error())
        }
    }
}

/// Evaluate a formula expression
pub fn evaluate(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match expr {
        // === Literals ===
        FormulaExpr::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaExpr::String(s) => Ok(FormulaValue::String(s.clone())),
        FormulaExpr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),
        FormulaExpr::Error(e) => Ok(FormulaValue::Error(*e)),

        // === References ===
        FormulaExpr::CellRef(addr) => Ok(ctx.get_cell_value(*addr)),
        FormulaExpr::RangeRef(range) => ctx.get_range_values(range),

        // === Operators ===
        FormulaExpr::BinaryOp { op, left, right } => evaluate_binary_op(*op, left, right, ctx),
        FormulaExpr::UnaryOp { op, operand } => evaluate_unary_op(*op, operand, ctx),

        // === Functions ===
        FormulaExpr::Function { name, args } => evaluate_function(name, args, ctx),

        // === Arrays ===
        FormulaExpr::Array(rows) => {
            let mut result_rows = Vec::with_capacity(rows.len());
            for row in rows {
                let mut result_row = Vec::with_capacity(row.len());
                for expr in row {
                    result_row.push(evaluate(expr, ctx)?);
                }
                result_rows.push(result_row);
            }
            Ok(FormulaValue::Array(result_rows))
        }
    }
}

/// Coerce an arithmetic operand
///
/// Text read straight from a cell counts as 0; text produced any other way
/// must parse as a number.
fn arithmetic_operand(expr: &FormulaExpr, value: &FormulaValue) -> Result<f64, CellError> {
    match value {
        FormulaValue::Error(e) => Err(*e),
        FormulaValue::Number(n) => Ok(*n),
        FormulaValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        FormulaValue::Empty => Ok(0.0),
        FormulaValue::String(s) => match parse_number(s) {
            Some(n) => Ok(n),
            None if matches!(expr, FormulaExpr::CellRef(_)) => Ok(0.0),
            None => Err(CellError::Value),
        },
        FormulaValue::Array(_) => Err(CellError::Value),
    }
}

fn number_result(n: f64) -> FormulaValue {
    if n.is_finite() {
        FormulaValue::Number(n)
    } else {
        FormulaValue::Error(CellError::Num)
    }
}

/// Evaluate a binary operation
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &FormulaExpr,
    right: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    // Evaluate operands first
    let left_val = evaluate(left, ctx)?;
    let right_val = evaluate(right, ctx)?;

    // Propagate errors, leftmost first
    if let Some(e) = left_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    if let Some(e) = right_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    let arithmetic = |f: fn(f64, f64) -> FormulaValue| -> FormulaValue {
        let l = match arithmetic_operand(left, &left_val) {
            Ok(n) => n,
            Err(e) => return FormulaValue::Error(e),
        };
        match arithmetic_operand(right, &right_val) {
            Ok(r) => f(l, r),
            Err(e) => FormulaValue::Error(e),
        }
    };

    let value = match op {
        // Arithmetic operators
        BinaryOperator::Add => arithmetic(|l, r| number_result(l + r)),
        BinaryOperator::Subtract => arithmetic(|l, r| number_result(l - r)),
        BinaryOperator::Multiply => arithmetic(|l, r| number_result(l * r)),
        BinaryOperator::Divide => arithmetic(|l, r| {
            if r == 0.0 {
                FormulaValue::Error(CellError::Div0)
            } else {
                number_result(l / r)
            }
        }),
        BinaryOperator::Power => arithmetic(|l, r| number_result(l.powf(r))),

        // Comparison operators
        BinaryOperator::Equal => compare_op(&left_val, &right_val, Ordering::is_eq),
        BinaryOperator::NotEqual => compare_op(&left_val, &right_val, Ordering::is_ne),
        BinaryOperator::LessThan => compare_op(&left_val, &right_val, Ordering::is_lt),
        BinaryOperator::LessEqual => compare_op(&left_val, &right_val, Ordering::is_le),
        BinaryOperator::GreaterThan => compare_op(&left_val, &right_val, Ordering::is_gt),
        BinaryOperator::GreaterEqual => compare_op(&left_val, &right_val, Ordering::is_ge),

        // Concatenation
        BinaryOperator::Concat => {
            if matches!(left_val, FormulaValue::Array(_)) || matches!(right_val, FormulaValue::Array(_)) {
                FormulaValue::Error(CellError::Value)
            } else {
                FormulaValue::String(left_val.as_string() + &right_val.as_string())
            }
        }
    };

    Ok(value)
}

fn compare_op(left: &FormulaValue, right: &FormulaValue, test: fn(Ordering) -> bool) -> FormulaValue {
    if matches!(left, FormulaValue::Array(_)) || matches!(right, FormulaValue::Array(_)) {
        return FormulaValue::Error(CellError::Value);
    }
    FormulaValue::Boolean(test(compare_values(left, right)))
}

/// Compare two values for ordering
///
/// Empty compares as 0, text compares case-insensitively and mixed types
/// order as number < text < boolean.
pub fn compare_values(left: &FormulaValue, right: &FormulaValue) -> Ordering {
    fn rank(v: &FormulaValue) -> u8 {
        match v {
            FormulaValue::Number(_) | FormulaValue::Empty => 0,
            FormulaValue::String(_) => 1,
            FormulaValue::Boolean(_) => 2,
            FormulaValue::Error(_) => 3,
            FormulaValue::Array(_) => 4,
        }
    }

    match (left, right) {
        // Blank text and empty cells are interchangeable
        (FormulaValue::Empty, FormulaValue::String(s)) if s.is_empty() => Ordering::Equal,
        (FormulaValue::String(s), FormulaValue::Empty) if s.is_empty() => Ordering::Equal,

        (FormulaValue::Number(_) | FormulaValue::Empty, FormulaValue::Number(_) | FormulaValue::Empty) => {
            let l = left.as_number().unwrap_or(0.0);
            let r = right.as_number().unwrap_or(0.0);
            l.partial_cmp(&r).unwrap_or(Ordering::Equal)
        }

        // Strings compare case-insensitively
        (FormulaValue::String(l), FormulaValue::String(r)) => l.to_lowercase().cmp(&r.to_lowercase()),

        // Booleans: FALSE < TRUE
        (FormulaValue::Boolean(l), FormulaValue::Boolean(r)) => l.cmp(r),

        (FormulaValue::Error(l), FormulaValue::Error(r)) => l.code().cmp(&r.code()),

        _ => rank(left).cmp(&rank(right)),
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(
    op: UnaryOperator,
    operand: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let val = evaluate(operand, ctx)?;

    let n = match arithmetic_operand(operand, &val) {
        Ok(n) => n,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };

    Ok(match op {
        UnaryOperator::Negate => number_result(-n),
        UnaryOperator::Percent => number_result(n / 100.0),
    })
}

/// Evaluate a function call
fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let registry = function_registry();

    let func = registry
        .get(name)
        .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;

    // Check argument count
    if args.len() < func.min_args {
        return Err(FormulaError::ArgumentCount {
            function: name.to_string(),
            expected: format!("at least {}", func.min_args),
            actual: args.len(),
        });
    }

    if let Some(max) = func.max_args {
        if args.len() > max {
            return Err(FormulaError::ArgumentCount {
                function: name.to_string(),
                expected: format!("at most {}", max),
                actual: args.len(),
            });
        }
    }

    // A failing argument becomes its sentinel so IFERROR/IFNA can trap it
    let evaluated_args: Vec<FormulaValue> = args
        .iter()
        .map(|arg| evaluate(arg, ctx).unwrap_or_else(|err| FormulaValue::Error(err.to_cell_error())))
        .collect();

    (func.implementation)(&evaluated_args, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eval(formula: &str) -> FormulaResult<FormulaValue> {
        let ast = parse_formula(formula)?;
        let ctx = EvaluationContext::simple();
        evaluate(&ast, &ctx)
    }

    fn grid_with(values: &[(&str, &str)]) -> Grid {
        let mut grid = Grid::new();
        for (label, value) in values {
            let addr = CellAddress::from_label(label).unwrap();
            grid.set_value(addr, *value).unwrap();
        }
        grid
    }

    fn eval_in(grid: &Grid, formula: &str) -> ComputedValue {
        evaluate_formula(formula, &EvaluationContext::new(grid))
    }

    #[test]
    fn test_evaluate_literals() {
        assert_eq!(eval("=42").unwrap(), FormulaValue::Number(42.0));
        assert_eq!(eval("='Hello'").unwrap(), FormulaValue::String("Hello".into()));
        assert_eq!(eval("=TRUE").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=#VALUE!").unwrap(), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_evaluate_arithmetic() {
        assert_eq!(eval("=1+2").unwrap(), FormulaValue::Number(3.0));
        assert_eq!(eval("=10-3").unwrap(), FormulaValue::Number(7.0));
        assert_eq!(eval("=4*5").unwrap(), FormulaValue::Number(20.0));
        assert_eq!(eval("=20/4").unwrap(), FormulaValue::Number(5.0));
        assert_eq!(eval("=2^10").unwrap(), FormulaValue::Number(1024.0));
        assert_eq!(eval("=(1+2)*3").unwrap(), FormulaValue::Number(9.0));
        assert_eq!(eval("=-5+50%").unwrap(), FormulaValue::Number(-4.5));
    }

    #[test]
    fn test_evaluate_numeric_failures() {
        assert_eq!(eval("=1/0").unwrap(), FormulaValue::Error(CellError::Div0));
        assert_eq!(eval("=(-1)^0.5").unwrap(), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=10^400").unwrap(), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=\"abc\"+1").unwrap(), FormulaValue::Error(CellError::Value));
        assert_eq!(eval("=\"3\"+1").unwrap(), FormulaValue::Number(4.0));
        assert_eq!(eval("=TRUE+1").unwrap(), FormulaValue::Number(2.0));
    }

    #[test]
    fn test_evaluate_comparison_and_concat() {
        assert_eq!(eval("=1<2").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=5<>5").unwrap(), FormulaValue::Boolean(false));
        assert_eq!(eval("=5!=6").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=\"a\"=\"A\"").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=1<\"a\"").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(
            eval("=\"Value: \"&42").unwrap(),
            FormulaValue::String("Value: 42".into())
        );
    }

    #[test]
    fn test_cell_references() {
        let grid = grid_with(&[("A1", "5"), ("A2", "apples"), ("A3", "2.5")]);
        assert_eq!(eval_in(&grid, "=A1*2"), ComputedValue::Number(10.0));
        assert_eq!(eval_in(&grid, "=A1+A3"), ComputedValue::Number(7.5));
        // Text in a referenced cell counts as zero
        assert_eq!(eval_in(&grid, "=A2+1"), ComputedValue::Number(1.0));
        // Empty cells read as zero, and so does an empty final result
        assert_eq!(eval_in(&grid, "=B9+1"), ComputedValue::Number(1.0));
        assert_eq!(eval_in(&grid, "=B9"), ComputedValue::Number(0.0));
        assert_eq!(eval_in(&grid, "=A2"), ComputedValue::Text("apples".into()));
    }

    #[test]
    fn test_errors_propagate_through_references() {
        let mut grid = grid_with(&[("A2", "3")]);
        grid.set_value(CellAddress::new(0, 0), "=1/0").unwrap();
        grid.set_computed(CellAddress::new(0, 0), ComputedValue::Error(CellError::Div0));

        assert_eq!(eval_in(&grid, "=A1+1"), ComputedValue::Error(CellError::Div0));
        assert_eq!(eval_in(&grid, "=A2+A1"), ComputedValue::Error(CellError::Div0));
        assert_eq!(eval_in(&grid, "=SUM(A1:A2)"), ComputedValue::Error(CellError::Div0));
        assert_eq!(eval_in(&grid, "=IFERROR(A1,7)"), ComputedValue::Number(7.0));
    }

    #[test]
    fn test_out_of_bounds_and_malformed_references() {
        let grid = Grid::with_size(10, 5);
        assert_eq!(eval_in(&grid, "=Z1"), ComputedValue::Error(CellError::Ref));
        assert_eq!(eval_in(&grid, "=A11+1"), ComputedValue::Error(CellError::Ref));
        assert_eq!(eval_in(&grid, "=SUM(A1:A11)"), ComputedValue::Error(CellError::Ref));
        assert_eq!(eval_in(&grid, "=SUM(A1:5)"), ComputedValue::Error(CellError::Ref));
    }

    #[test]
    fn test_range_ceiling() {
        let grid = Grid::with_size(1000, 52);
        let ctx = EvaluationContext::new(&grid).with_max_range_cells(100);
        assert_eq!(
            evaluate_formula("=SUM(A1:A100)", &ctx),
            ComputedValue::Number(0.0)
        );
        assert_eq!(
            evaluate_formula("=SUM(A1:A101)", &ctx),
            ComputedValue::Error(CellError::Ref)
        );
        assert_eq!(
            evaluate_formula("=IFERROR(SUM(A1:B100),-1)", &ctx),
            ComputedValue::Number(-1.0)
        );
    }

    #[test]
    fn test_unparseable_and_unknown() {
        let grid = Grid::new();
        assert_eq!(eval_in(&grid, "=1+"), ComputedValue::Error(CellError::Generic));
        assert_eq!(eval_in(&grid, "=NOPE(1)"), ComputedValue::Error(CellError::Generic));
        assert_eq!(eval_in(&grid, "=ABS(1,2)"), ComputedValue::Error(CellError::Generic));
        assert_eq!(eval_in(&grid, "={1,2}"), ComputedValue::Error(CellError::Value));
    }

    #[test]
    fn test_nested_same_function() {
        let grid = grid_with(&[("A1", "1"), ("A2", "2")]);
        assert_eq!(
            eval_in(&grid, "=SUM(SUM(A1:A2),SUM(1,SUM(2,3)))"),
            ComputedValue::Number(9.0)
        );
        assert_eq!(
            eval_in(&grid, "=IF(A1>0,IF(A2>5,\"big\",\"small\"),\"neg\")"),
            ComputedValue::Text("small".into())
        );
    }

    #[test]
    fn test_compare_values_ordering() {
        use FormulaValue as V;
        assert_eq!(compare_values(&V::Empty, &V::Number(0.0)), Ordering::Equal);
        assert_eq!(compare_values(&V::Empty, &V::String(String::new())), Ordering::Equal);
        assert_eq!(compare_values(&V::Number(9.0), &V::String("a".into())), Ordering::Less);
        assert_eq!(compare_values(&V::String("z".into()), &V::Boolean(false)), Ordering::Less);
        assert_eq!(compare_values(&V::Boolean(false), &V::Boolean(true)), Ordering::Less);
    }
}
