//! Logical functions

use super::{cells_of, guarded, number_arg, to_bool};
use crate::error::FormulaResult;
use crate::evaluator::{compare_values, EvaluationContext, FormulaValue};
use sheetmaster_core::CellError;

/// IF(condition, value_if_true, [value_if_false])
pub fn fn_if(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        if to_bool(&args[0])? {
            Ok(args[1].clone())
        } else {
            Ok(args.get(2).cloned().unwrap_or(FormulaValue::Boolean(false)))
        }
    })
}

/// IFS(condition1, value1, ...) - first true condition wins, #N/A when none is
pub fn fn_ifs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        if args.len() % 2 != 0 {
            return Err(CellError::Generic);
        }
        for pair in args.chunks(2) {
            if to_bool(&pair[0])? {
                return Ok(pair[1].clone());
            }
        }
        Err(CellError::Na)
    })
}

/// Truth values of every argument; blanks and text inside ranges are skipped
fn truth_values(args: &[FormulaValue]) -> Result<Vec<bool>, CellError> {
    let mut values = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Array(_) => {
                for cell in cells_of(arg) {
                    match cell {
                        FormulaValue::Error(e) => return Err(*e),
                        FormulaValue::Boolean(b) => values.push(*b),
                        FormulaValue::Number(n) => values.push(*n != 0.0),
                        _ => {}
                    }
                }
            }
            other => values.push(to_bool(other)?),
        }
    }
    if values.is_empty() {
        return Err(CellError::Value);
    }
    Ok(values)
}

/// AND function
pub fn fn_and(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Boolean(truth_values(args)?.iter().all(|b| *b))))
}

/// OR function
pub fn fn_or(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Boolean(truth_values(args)?.iter().any(|b| *b))))
}

/// XOR function - true when an odd number of arguments are true
pub fn fn_xor(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let true_count = truth_values(args)?.iter().filter(|b| **b).count();
        Ok(FormulaValue::Boolean(true_count % 2 == 1))
    })
}

/// NOT function
pub fn fn_not(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Boolean(!to_bool(&args[0])?)))
}

/// SWITCH(expression, value1, result1, ..., [default])
pub fn fn_switch(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let expression = &args[0];
        if let FormulaValue::Error(e) = expression {
            return Err(*e);
        }

        let cases = &args[1..];
        for pair in cases.chunks_exact(2) {
            if let FormulaValue::Error(e) = &pair[0] {
                return Err(*e);
            }
            if compare_values(expression, &pair[0]).is_eq() {
                return Ok(pair[1].clone());
            }
        }

        // An odd number of trailing arguments ends in a default
        match cases.chunks_exact(2).remainder() {
            [default] => Ok(default.clone()),
            _ => Err(CellError::Na),
        }
    })
}

/// IFERROR(value, value_if_error)
pub fn fn_iferror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if args[0].is_error() {
        Ok(args[1].clone())
    } else {
        Ok(args[0].clone())
    }
}

/// IFNA(value, value_if_na)
pub fn fn_ifna(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if args[0].get_error() == Some(CellError::Na) {
        Ok(args[1].clone())
    } else {
        Ok(args[0].clone())
    }
}

/// CHOOSE(index, value1, ...)
pub fn fn_choose(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let index = number_arg(args, 0)?.trunc();
        if index < 1.0 || index >= args.len() as f64 {
            return Err(CellError::Value);
        }
        Ok(args[index as usize].clone())
    })
}

/// TRUE()
pub fn fn_true(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(true))
}

/// FALSE()
pub fn fn_false(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(false))
}
