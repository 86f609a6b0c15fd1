//! Statistical functions

use super::criteria::{CriteriaMatcher, CriteriaSet};
use super::{cells_of, collect_numbers, flatten, guarded, num, number_arg, opt_number_arg};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use sheetmaster_core::{parse_number, CellError};

// === Shared helpers ===

fn mean(values: &[f64]) -> Result<f64, CellError> {
    if values.is_empty() {
        return Err(CellError::Div0);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample (`sample = true`) or population variance
fn variance(values: &[f64], sample: bool) -> Result<f64, CellError> {
    let n = values.len();
    let min_len = if sample { 2 } else { 1 };
    if n < min_len {
        return Err(CellError::Div0);
    }
    let avg = mean(values)?;
    let squares: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    let divisor = if sample { n - 1 } else { n };
    Ok(squares / divisor as f64)
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Numbers held by the first argument (a range or array)
fn range_numbers(args: &[FormulaValue]) -> Result<Vec<f64>, CellError> {
    collect_numbers(&args[..1])
}

// === Basic aggregates ===

/// AVERAGE function
pub fn fn_average(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(mean(&collect_numbers(args)?)?))
}

/// MAX function; no numbers gives 0
pub fn fn_max(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let numbers = collect_numbers(args)?;
        Ok(FormulaValue::Number(
            numbers.into_iter().reduce(f64::max).unwrap_or(0.0),
        ))
    })
}

/// MIN function; no numbers gives 0
pub fn fn_min(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let numbers = collect_numbers(args)?;
        Ok(FormulaValue::Number(
            numbers.into_iter().reduce(f64::min).unwrap_or(0.0),
        ))
    })
}

/// COUNT function - counts numbers, never fails on errors
pub fn fn_count(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut count = 0usize;

    for arg in args {
        match arg {
            FormulaValue::Array(rows) => {
                count += rows
                    .iter()
                    .flatten()
                    .filter(|v| matches!(v, FormulaValue::Number(_)))
                    .count();
            }
            FormulaValue::Number(_) | FormulaValue::Boolean(_) => count += 1,
            FormulaValue::String(s) if parse_number(s).is_some() => count += 1,
            _ => {}
        }
    }

    Ok(FormulaValue::Number(count as f64))
}

/// COUNTA function - counts non-blank values, errors included
pub fn fn_counta(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = flatten(args).filter(|v| !v.is_blank()).count();
    Ok(FormulaValue::Number(count as f64))
}

/// COUNTBLANK(range)
pub fn fn_countblank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = cells_of(&args[0]).into_iter().filter(|v| v.is_blank()).count();
    Ok(FormulaValue::Number(count as f64))
}

// === Distribution ===

/// MEDIAN function
pub fn fn_median(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let values = sorted(collect_numbers(args)?);
        let n = values.len();
        if n == 0 {
            return Err(CellError::Num);
        }
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };
        num(median)
    })
}

/// MODE function - most frequent value, earliest wins ties
pub fn fn_mode(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let values = collect_numbers(args)?;

        let mut best: Option<(f64, usize)> = None;
        for (i, v) in values.iter().enumerate() {
            // Only the first occurrence of each value is scored
            if values[..i].contains(v) {
                continue;
            }
            let count = values[i..].iter().filter(|x| *x == v).count();
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((*v, count));
            }
        }

        match best {
            Some((v, count)) if count > 1 => Ok(FormulaValue::Number(v)),
            _ => Err(CellError::Na),
        }
    })
}

/// STDEV function (sample)
pub fn fn_stdev(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(variance(&collect_numbers(args)?, true)?.sqrt()))
}

/// VAR function (sample)
pub fn fn_var(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(variance(&collect_numbers(args)?, true)?))
}

fn kth(args: &[FormulaValue], descending: bool) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let mut values = sorted(range_numbers(args)?);
        if descending {
            values.reverse();
        }
        let k = number_arg(args, 1)?.ceil();
        if k < 1.0 || k > values.len() as f64 {
            return Err(CellError::Num);
        }
        Ok(FormulaValue::Number(values[k as usize - 1]))
    })
}

/// LARGE(array, k) - k-th largest value
pub fn fn_large(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    kth(args, true)
}

/// SMALL(array, k) - k-th smallest value
pub fn fn_small(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    kth(args, false)
}

/// PERCENTILE(array, k) - linear interpolation between closest ranks
pub fn fn_percentile(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let values = sorted(range_numbers(args)?);
        let k = number_arg(args, 1)?;
        if values.is_empty() || !(0.0..=1.0).contains(&k) {
            return Err(CellError::Num);
        }
        let pos = (values.len() - 1) as f64 * k;
        let lower = pos.floor() as usize;
        let upper = pos.ceil() as usize;
        num(values[lower] + (pos - lower as f64) * (values[upper] - values[lower]))
    })
}

/// PERCENTRANK(array, x) - share of values strictly below x
pub fn fn_percentrank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let values = sorted(range_numbers(args)?);
        let x = number_arg(args, 1)?;
        if values.len() < 2 {
            return Ok(FormulaValue::Number(0.0));
        }
        if x < values[0] || x > values[values.len() - 1] {
            return Err(CellError::Na);
        }
        let below = values.iter().filter(|v| **v < x).count();
        num(below as f64 / (values.len() - 1) as f64)
    })
}

/// RANK(number, ref, [order]) - order 0 ranks descending
pub fn fn_rank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let x = number_arg(args, 0)?;
        let values = collect_numbers(&args[1..2])?;
        let ascending = opt_number_arg(args, 2, 0.0)? != 0.0;

        if !values.contains(&x) {
            return Err(CellError::Na);
        }
        let ahead = values
            .iter()
            .filter(|v| if ascending { **v < x } else { **v > x })
            .count();
        Ok(FormulaValue::Number((ahead + 1) as f64))
    })
}

/// SUBTOTAL(function_num, ref1, ...)
///
/// Codes 1-11 select AVERAGE, COUNT, COUNTA, MAX, MIN, PRODUCT, STDEV, STDEVP,
/// SUM, VAR and VARP; 101-111 are accepted as the same functions.
pub fn fn_subtotal(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let code = match number_arg(args, 0) {
        Ok(n) => n.trunc() as i64,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };
    let code = if (101..=111).contains(&code) { code - 100 } else { code };
    let refs = &args[1..];

    match code {
        1 => fn_average(refs, ctx),
        2 => fn_count(refs, ctx),
        3 => fn_counta(refs, ctx),
        4 => fn_max(refs, ctx),
        5 => fn_min(refs, ctx),
        6 => super::math::fn_product(refs, ctx),
        7 => fn_stdev(refs, ctx),
        8 => guarded(|| num(variance(&collect_numbers(refs)?, false)?.sqrt())),
        9 => super::math::fn_sum(refs, ctx),
        10 => fn_var(refs, ctx),
        11 => guarded(|| num(variance(&collect_numbers(refs)?, false)?)),
        _ => Ok(FormulaValue::Error(CellError::Value)),
    }
}

// === Conditional aggregates ===

/// COUNTIF(range, criteria)
pub fn fn_countif(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if let FormulaValue::Error(e) = &args[1] {
        return Ok(FormulaValue::Error(*e));
    }
    let matcher = CriteriaMatcher::new(&args[1]);
    let count = cells_of(&args[0])
        .into_iter()
        .filter(|v| matcher.matches(v))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

/// COUNTIFS(criteria_range1, criteria1, ...)
pub fn fn_countifs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let criteria = CriteriaSet::from_pairs(args)?;
        let count = (0..criteria.len()).filter(|i| criteria.matches(*i)).count();
        Ok(FormulaValue::Number(count as f64))
    })
}

/// Mean of the matched values, 0 when nothing matched
fn conditional_mean(values: &[f64]) -> Result<FormulaValue, CellError> {
    if values.is_empty() {
        return Ok(FormulaValue::Number(0.0));
    }
    num(mean(values)?)
}

/// AVERAGEIF(range, criteria, [average_range])
pub fn fn_averageif(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        if let FormulaValue::Error(e) = &args[1] {
            return Err(*e);
        }
        let range = cells_of(&args[0]);
        let average_range = args.get(2).map_or_else(|| range.clone(), cells_of);
        let matcher = CriteriaMatcher::new(&args[1]);

        let mut values = Vec::new();
        for (i, candidate) in range.iter().enumerate() {
            if !matcher.matches(candidate) {
                continue;
            }
            match average_range.get(i) {
                Some(FormulaValue::Number(n)) => values.push(*n),
                Some(FormulaValue::Error(e)) => return Err(*e),
                _ => {}
            }
        }
        conditional_mean(&values)
    })
}

/// AVERAGEIFS(average_range, criteria_range1, criteria1, ...)
pub fn fn_averageifs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let average_range = cells_of(&args[0]);
        let criteria = CriteriaSet::from_pairs(&args[1..])?;

        let mut values = Vec::new();
        for i in 0..criteria.len().min(average_range.len()) {
            if !criteria.matches(i) {
                continue;
            }
            match average_range[i] {
                FormulaValue::Number(n) => values.push(*n),
                FormulaValue::Error(e) => return Err(*e),
                _ => {}
            }
        }
        conditional_mean(&values)
    })
}

#[cfg(test)]
mod tests {
    use crate::evaluator::{evaluate_formula, EvaluationContext};
    use pretty_assertions::assert_eq;
    use sheetmaster_core::{CellAddress, CellError, ComputedValue, Grid};

    fn eval(formula: &str) -> ComputedValue {
        evaluate_formula(formula, &EvaluationContext::simple())
    }

    fn grid() -> Grid {
        // A1:A6 = 3, 1, 4, 1, 5, 9 ; B1:B6 = x, y, x, "", x, y
        let mut grid = Grid::new();
        let numbers = ["3", "1", "4", "1", "5", "9"];
        let tags = ["x", "y", "x", "", "x", "y"];
        for i in 0..6u32 {
            grid.set_value(CellAddress::new(i, 0), numbers[i as usize]).unwrap();
            grid.set_value(CellAddress::new(i, 1), tags[i as usize]).unwrap();
        }
        grid
    }

    fn eval_in(formula: &str) -> ComputedValue {
        let grid = grid();
        evaluate_formula(formula, &EvaluationContext::new(&grid))
    }

    fn n(v: f64) -> ComputedValue {
        ComputedValue::Number(v)
    }

    fn e(err: CellError) -> ComputedValue {
        ComputedValue::Error(err)
    }

    #[test]
    fn test_basic_aggregates() {
        assert_eq!(eval("=AVERAGE(2,4,6)"), n(4.0));
        assert_eq!(eval("=MAX(5,2,8,1)"), n(8.0));
        assert_eq!(eval("=MIN(5,2,8,1)"), n(1.0));
        assert_eq!(eval("=COUNT(1,2,\"a\",3)"), n(3.0));
        assert_eq!(eval_in("=AVERAGE(B1:B6)"), e(CellError::Div0));
        assert_eq!(eval_in("=MAX(B1:B6)"), n(0.0));
        assert_eq!(eval_in("=COUNTA(A1:B6)"), n(11.0));
        assert_eq!(eval_in("=COUNTBLANK(B1:B6)"), n(1.0));
        assert_eq!(eval_in("=COUNT(A1:B6)"), n(6.0));
    }

    #[test]
    fn test_distribution() {
        assert_eq!(eval_in("=MEDIAN(A1:A6)"), n(3.5));
        assert_eq!(eval_in("=MODE(A1:A6)"), n(1.0));
        assert_eq!(eval("=MODE(1,2,3)"), e(CellError::Na));
        assert_eq!(eval("=VAR(2,4,4,4,5,5,7,9)"), n(32.0 / 7.0));
        assert_eq!(eval("=STDEV(1)"), e(CellError::Div0));
        assert_eq!(eval_in("=LARGE(A1:A6,2)"), n(5.0));
        assert_eq!(eval_in("=SMALL(A1:A6,2)"), n(1.0));
        assert_eq!(eval_in("=SMALL(A1:A6,7)"), e(CellError::Num));
        assert_eq!(eval("=PERCENTILE({1,2,3,4},0.5)"), n(2.5));
        assert_eq!(eval("=PERCENTILE({1,2,3,4},1.5)"), e(CellError::Num));
        assert_eq!(eval("=PERCENTRANK({1,2,3,4,5},3)"), n(0.5));
        assert_eq!(eval("=PERCENTRANK({1,2,3},7)"), e(CellError::Na));
        assert_eq!(eval("=PERCENTRANK({1},7)"), n(0.0));
    }

    #[test]
    fn test_rank() {
        assert_eq!(eval_in("=RANK(5,A1:A6)"), n(2.0));
        assert_eq!(eval_in("=RANK(5,A1:A6,1)"), n(5.0));
        assert_eq!(eval_in("=RANK(1,A1:A6,1)"), n(1.0));
        assert_eq!(eval_in("=RANK(2,A1:A6)"), e(CellError::Na));
    }

    #[test]
    fn test_subtotal() {
        assert_eq!(eval_in("=SUBTOTAL(9,A1:A6)"), n(23.0));
        assert_eq!(eval_in("=SUBTOTAL(109,A1:A6)"), n(23.0));
        assert_eq!(eval_in("=SUBTOTAL(2,A1:B6)"), n(6.0));
        assert_eq!(eval_in("=SUBTOTAL(4,A1:A6)"), n(9.0));
        assert_eq!(eval("=SUBTOTAL(11,{1,3})"), n(1.0));
        assert_eq!(eval_in("=SUBTOTAL(12,A1:A6)"), e(CellError::Value));
    }

    #[test]
    fn test_conditional_counts_and_averages() {
        assert_eq!(eval_in("=COUNTIF(B1:B6,\"x\")"), n(3.0));
        assert_eq!(eval_in("=COUNTIF(A1:A6,\">=4\")"), n(3.0));
        assert_eq!(eval_in("=COUNTIFS(B1:B6,\"x\",A1:A6,\">3\")"), n(2.0));
        assert_eq!(eval_in("=COUNTIFS(B1:B6,\"x\",A1:A6)"), e(CellError::Generic));
        assert_eq!(eval_in("=AVERAGEIF(B1:B6,\"y\",A1:A6)"), n(5.0));
        assert_eq!(eval_in("=AVERAGEIF(B1:B6,\"z\",A1:A6)"), n(0.0));
        assert_eq!(eval_in("=AVERAGEIFS(A1:A6,B1:B6,\"z\")"), n(0.0));
        assert_eq!(eval_in("=AVERAGEIFS(A1:A6,B1:B6,\"x\",A1:A6,\"<5\")"), n(3.5));
    }

    #[test]
    fn test_text_criteria_are_case_sensitive() {
        let mut grid = Grid::new();
        for (row, fruit) in ["Apple", "apple", "APPLE"].into_iter().enumerate() {
            grid.set_value(CellAddress::new(row as u32, 0), fruit).unwrap();
        }
        let ctx = EvaluationContext::new(&grid);

        assert_eq!(evaluate_formula("=COUNTIF(A1:A3,\"apple\")", &ctx), n(1.0));
        assert_eq!(evaluate_formula("=COUNTIF(A1:A3,\"Apple\")", &ctx), n(1.0));
        assert_eq!(evaluate_formula("=COUNTIF(A1:A3,\"<>apple\")", &ctx), n(2.0));
        assert_eq!(evaluate_formula("=COUNTIFS(A1:A3,\"APPLE\")", &ctx), n(1.0));
    }
}
