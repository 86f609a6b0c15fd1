//! Information functions

use super::{guarded, to_number};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use sheetmaster_core::CellError;

fn is(args: &[FormulaValue], test: impl FnOnce(&FormulaValue) -> bool) -> FormulaResult<FormulaValue> {
    let v = &args[0];
    if matches!(v, FormulaValue::Array(_)) {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    Ok(FormulaValue::Boolean(test(v)))
}

/// ISBLANK(value)
pub fn fn_isblank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, |v| matches!(v, FormulaValue::Empty))
}

/// ISNUMBER(value)
pub fn fn_isnumber(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, |v| matches!(v, FormulaValue::Number(_)))
}

/// ISTEXT(value)
pub fn fn_istext(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, |v| matches!(v, FormulaValue::String(_)))
}

/// ISERROR(value)
pub fn fn_iserror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, |v| matches!(v, FormulaValue::Error(_)))
}

/// ISNA(value)
pub fn fn_isna(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    is(args, |v| matches!(v, FormulaValue::Error(CellError::Na)))
}

fn parity(args: &[FormulaValue], even: bool) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = to_number(&args[0])?.trunc();
        Ok(FormulaValue::Boolean((n % 2.0 == 0.0) == even))
    })
}

/// ISEVEN(number)
pub fn fn_iseven(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    parity(args, true)
}

/// ISODD(number)
pub fn fn_isodd(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    parity(args, false)
}

/// NA()
pub fn fn_na(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Error(CellError::Na))
}

#[cfg(test)]
mod tests {
    use crate::evaluator::{evaluate_formula, EvaluationContext};
    use pretty_assertions::assert_eq;
    use sheetmaster_core::{CellAddress, CellError, ComputedValue, Grid};

    fn eval(formula: &str) -> ComputedValue {
        let mut grid = Grid::new();
        grid.set_value(CellAddress::new(0, 0), "42").unwrap();
        grid.set_value(CellAddress::new(0, 1), "hello").unwrap();
        evaluate_formula(formula, &EvaluationContext::new(&grid))
    }

    fn b(v: bool) -> ComputedValue {
        ComputedValue::Boolean(v)
    }

    #[test]
    fn test_type_predicates() {
        assert_eq!(eval("=ISBLANK(C1)"), b(true));
        assert_eq!(eval("=ISBLANK(A1)"), b(false));
        assert_eq!(eval("=ISNUMBER(A1)"), b(true));
        assert_eq!(eval("=ISNUMBER(B1)"), b(false));
        assert_eq!(eval("=ISTEXT(B1)"), b(true));
        assert_eq!(eval("=ISTEXT(A1)"), b(false));
        assert_eq!(eval("=ISBLANK(A1:B1)"), ComputedValue::Error(CellError::Value));
    }

    #[test]
    fn test_error_predicates() {
        assert_eq!(eval("=ISERROR(1/0)"), b(true));
        assert_eq!(eval("=ISERROR(A1)"), b(false));
        assert_eq!(eval("=ISNA(NA())"), b(true));
        assert_eq!(eval("=ISNA(1/0)"), b(false));
        assert_eq!(eval("=NA()"), ComputedValue::Error(CellError::Na));
    }

    #[test]
    fn test_parity() {
        assert_eq!(eval("=ISEVEN(A1)"), b(true));
        assert_eq!(eval("=ISODD(3.7)"), b(true));
        assert_eq!(eval("=ISODD(-2)"), b(false));
        assert_eq!(eval("=ISEVEN(B1)"), ComputedValue::Error(CellError::Value));
    }
}
