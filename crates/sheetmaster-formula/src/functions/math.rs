//! Math functions

use super::criteria::{CriteriaMatcher, CriteriaSet};
use super::{cells_of, collect_numbers, guarded, num, number_arg, opt_number_arg, to_number};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use sheetmaster_core::CellError;

/// SUM function
pub fn fn_sum(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(collect_numbers(args)?.iter().fold(0.0, |acc, n| acc + n)))
}

/// PRODUCT function
pub fn fn_product(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let numbers = collect_numbers(args)?;
        if numbers.is_empty() {
            return Ok(FormulaValue::Number(0.0));
        }
        num(numbers.iter().product())
    })
}

/// SUMSQ function
pub fn fn_sumsq(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(collect_numbers(args)?.iter().fold(0.0, |acc, n| acc + n * n)))
}

/// SUMPRODUCT(array1, [array2], ...)
///
/// All arrays must hold the same number of cells. Non-numeric values count as 0.
pub fn fn_sumproduct(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let arrays: Vec<Vec<&FormulaValue>> = args.iter().map(cells_of).collect();
        let len = arrays.first().map_or(0, Vec::len);
        if arrays.iter().any(|a| a.len() != len) {
            return Err(CellError::Value);
        }

        let mut sum = 0.0;
        for i in 0..len {
            let mut product = 1.0;
            for array in &arrays {
                product *= match array[i] {
                    FormulaValue::Number(n) => *n,
                    FormulaValue::Error(e) => return Err(*e),
                    _ => 0.0,
                };
            }
            sum += product;
        }
        num(sum)
    })
}

/// SUMIF(range, criteria, [sum_range])
pub fn fn_sumif(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        if let FormulaValue::Error(e) = &args[1] {
            return Err(*e);
        }
        let range = cells_of(&args[0]);
        let sum_range = args.get(2).map_or_else(|| range.clone(), cells_of);
        let matcher = CriteriaMatcher::new(&args[1]);

        let mut sum = 0.0;
        for (i, candidate) in range.iter().enumerate() {
            if !matcher.matches(candidate) {
                continue;
            }
            match sum_range.get(i) {
                Some(FormulaValue::Number(n)) => sum += n,
                Some(FormulaValue::Error(e)) => return Err(*e),
                _ => {}
            }
        }
        num(sum)
    })
}

/// SUMIFS(sum_range, criteria_range1, criteria1, ...)
pub fn fn_sumifs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let sum_range = cells_of(&args[0]);
        let criteria = CriteriaSet::from_pairs(&args[1..])?;

        let mut sum = 0.0;
        for i in 0..criteria.len().min(sum_range.len()) {
            if !criteria.matches(i) {
                continue;
            }
            match sum_range[i] {
                FormulaValue::Number(n) => sum += n,
                FormulaValue::Error(e) => return Err(*e),
                _ => {}
            }
        }
        num(sum)
    })
}

// === Rounding ===

/// Digit count, clamped to where a power of ten is already infinite
fn digits_arg(args: &[FormulaValue]) -> Result<i32, CellError> {
    Ok(opt_number_arg(args, 1, 0.0)?.trunc().clamp(-400.0, 400.0) as i32)
}

/// Scale by a power of ten, apply `f`, and scale back
fn round_with(n: f64, digits: i32, f: fn(f64) -> f64) -> Result<FormulaValue, CellError> {
    // Negative digits scale by a whole power of ten
    if digits >= 0 {
        let factor = 10_f64.powi(digits);
        num(f(n * factor) / factor)
    } else {
        let factor = 10_f64.powi(-digits);
        num(f(n / factor) * factor)
    }
}

/// ROUND(number, [num_digits]) - half away from zero
pub fn fn_round(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| round_with(number_arg(args, 0)?, digits_arg(args)?, f64::round))
}

/// ROUNDUP(number, [num_digits]) - away from zero
pub fn fn_roundup(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        round_with(number_arg(args, 0)?, digits_arg(args)?, |x| {
            if x >= 0.0 {
                x.ceil()
            } else {
                x.floor()
            }
        })
    })
}

/// ROUNDDOWN(number, [num_digits]) - toward zero
pub fn fn_rounddown(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| round_with(number_arg(args, 0)?, digits_arg(args)?, f64::trunc))
}

/// TRUNC(number, [num_digits])
pub fn fn_trunc(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    fn_rounddown(args, ctx)
}

/// INT(number) - rounds down to the nearest integer
pub fn fn_int(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(number_arg(args, 0)?.floor()))
}

/// CEILING(number, [significance]) - rounds up to a multiple of significance
pub fn fn_ceiling(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        let significance = opt_number_arg(args, 1, 1.0)?;
        if significance == 0.0 {
            return Ok(FormulaValue::Number(0.0));
        }
        if n > 0.0 && significance < 0.0 {
            return Err(CellError::Num);
        }
        num((n / significance).ceil() * significance)
    })
}

/// FLOOR(number, [significance]) - rounds down to a multiple of significance
pub fn fn_floor(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        let significance = opt_number_arg(args, 1, 1.0)?;
        if significance == 0.0 {
            return Err(CellError::Div0);
        }
        if n > 0.0 && significance < 0.0 {
            return Err(CellError::Num);
        }
        num((n / significance).floor() * significance)
    })
}

/// MROUND(number, multiple) - rounds to the nearest multiple
pub fn fn_mround(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        let multiple = number_arg(args, 1)?;
        if multiple == 0.0 {
            return Ok(FormulaValue::Number(0.0));
        }
        if n * multiple < 0.0 {
            return Err(CellError::Num);
        }
        num((n / multiple).round() * multiple)
    })
}

/// EVEN(number) - rounds away from zero to the nearest even integer
pub fn fn_even(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        let mut magnitude = n.abs().ceil();
        if magnitude % 2.0 != 0.0 {
            magnitude += 1.0;
        }
        num(magnitude.copysign(n))
    })
}

/// ODD(number) - rounds away from zero to the nearest odd integer
pub fn fn_odd(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        let mut magnitude = n.abs().ceil();
        if magnitude % 2.0 == 0.0 {
            magnitude += 1.0;
        }
        num(if n < 0.0 { -magnitude } else { magnitude })
    })
}

// === Arithmetic ===

/// ABS(number)
pub fn fn_abs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(number_arg(args, 0)?.abs()))
}

/// SIGN(number) - -1, 0 or 1
pub fn fn_sign(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        let sign = if n > 0.0 {
            1.0
        } else if n < 0.0 {
            -1.0
        } else {
            0.0
        };
        Ok(FormulaValue::Number(sign))
    })
}

/// SQRT(number)
pub fn fn_sqrt(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        if n < 0.0 {
            return Err(CellError::Num);
        }
        num(n.sqrt())
    })
}

/// POWER(number, power)
pub fn fn_power(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let base = number_arg(args, 0)?;
        let exponent = number_arg(args, 1)?;
        if base == 0.0 && exponent < 0.0 {
            return Err(CellError::Div0);
        }
        num(base.powf(exponent))
    })
}

/// MOD(number, divisor) - the result takes the sign of the divisor
pub fn fn_mod(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        let d = number_arg(args, 1)?;
        if d == 0.0 {
            return Err(CellError::Div0);
        }
        num(n - d * (n / d).floor())
    })
}

/// QUOTIENT(numerator, denominator) - integer part of a division
pub fn fn_quotient(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?;
        let d = number_arg(args, 1)?;
        if d == 0.0 {
            return Err(CellError::Div0);
        }
        num((n / d).trunc())
    })
}

/// EXP(number)
pub fn fn_exp(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(number_arg(args, 0)?.exp()))
}

fn positive(n: f64) -> Result<f64, CellError> {
    if n > 0.0 {
        Ok(n)
    } else {
        Err(CellError::Num)
    }
}

/// LN(number)
pub fn fn_ln(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(positive(number_arg(args, 0)?)?.ln()))
}

/// LOG(number, [base]) - base defaults to 10
pub fn fn_log(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = positive(number_arg(args, 0)?)?;
        let base = positive(opt_number_arg(args, 1, 10.0)?)?;
        if base == 1.0 {
            return Err(CellError::Div0);
        }
        num(n.log(base))
    })
}

/// LOG10(number)
pub fn fn_log10(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| num(positive(number_arg(args, 0)?)?.log10()))
}

/// FACT(number)
pub fn fn_fact(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let n = number_arg(args, 0)?.trunc();
        if n < 0.0 {
            return Err(CellError::Num);
        }
        // 171! overflows f64
        if n > 170.0 {
            return Err(CellError::Num);
        }
        num((1..=n as u32).map(f64::from).product())
    })
}

fn whole_numbers(args: &[FormulaValue]) -> Result<Vec<u64>, CellError> {
    collect_numbers(args)?
        .into_iter()
        .map(|n| {
            if n < 0.0 || n >= 2f64.powi(53) {
                Err(CellError::Num)
            } else {
                Ok(n.trunc() as u64)
            }
        })
        .collect()
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// GCD(number1, ...)
pub fn fn_gcd(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let result = whole_numbers(args)?.into_iter().fold(0, gcd);
        Ok(FormulaValue::Number(result as f64))
    })
}

/// LCM(number1, ...)
pub fn fn_lcm(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let mut result: u64 = 1;
        for n in whole_numbers(args)? {
            if n == 0 {
                return Ok(FormulaValue::Number(0.0));
            }
            result = (result / gcd(result, n))
                .checked_mul(n)
                .ok_or(CellError::Num)?;
        }
        Ok(FormulaValue::Number(result as f64))
    })
}

// === Trigonometry ===

/// PI()
pub fn fn_pi(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(std::f64::consts::PI))
}

fn unary(args: &[FormulaValue], f: fn(f64) -> f64) -> FormulaResult<FormulaValue> {
    guarded(|| num(f(number_arg(args, 0)?)))
}

/// RADIANS(angle)
pub fn fn_radians(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::to_radians)
}

/// DEGREES(angle)
pub fn fn_degrees(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::to_degrees)
}

/// SIN(number)
pub fn fn_sin(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::sin)
}

/// COS(number)
pub fn fn_cos(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::cos)
}

/// TAN(number)
pub fn fn_tan(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::tan)
}

/// ASIN(number) - #NUM! outside [-1, 1]
pub fn fn_asin(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::asin)
}

/// ACOS(number) - #NUM! outside [-1, 1]
pub fn fn_acos(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::acos)
}

/// ATAN(number)
pub fn fn_atan(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::atan)
}

/// ATAN2(x_num, y_num)
pub fn fn_atan2(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let x = number_arg(args, 0)?;
        let y = number_arg(args, 1)?;
        if x == 0.0 && y == 0.0 {
            return Err(CellError::Div0);
        }
        num(y.atan2(x))
    })
}

/// SINH(number)
pub fn fn_sinh(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::sinh)
}

/// COSH(number)
pub fn fn_cosh(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::cosh)
}

/// TANH(number)
pub fn fn_tanh(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, f64::tanh)
}

// === Random (volatile) ===

/// RAND() - Returns a random number between 0 and 1
pub fn fn_rand(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    Ok(FormulaValue::Number(rng.gen::<f64>()))
}

/// RANDBETWEEN(bottom, top) - Returns a random integer between bottom and top (inclusive)
pub fn fn_randbetween(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    use rand::Rng;

    guarded(|| {
        let bottom = to_number(&args[0])?.ceil() as i64;
        let top = to_number(&args[1])?.floor() as i64;
        if bottom > top {
            return Err(CellError::Num);
        }

        let mut rng = rand::thread_rng();
        Ok(FormulaValue::Number(rng.gen_range(bottom..=top) as f64))
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

    fn number(formula: &str) -> f64 {
        match eval(formula) {
            ComputedValue::Number(n) => n,
            other => panic!("{} gave {:?}", formula, other),
        }
    }

    fn error(formula: &str) -> CellError {
        match eval(formula) {
            ComputedValue::Error(e) => e,
            other => panic!("{} gave {:?}", formula, other),
        }
    }

    fn sample_grid() -> Grid {
        // A: 1..=5, B: fruit names, C: 10..=50
        let mut grid = Grid::new();
        let fruit = ["apple", "pear", "apple", "plum", "apple"];
        for i in 0..5u32 {
            grid.set_value(CellAddress::new(i, 0), (i + 1).to_string()).unwrap();
            grid.set_value(CellAddress::new(i, 1), fruit[i as usize]).unwrap();
            grid.set_value(CellAddress::new(i, 2), ((i + 1) * 10).to_string()).unwrap();
        }
        grid
    }

    fn eval_in(grid: &Grid, formula: &str) -> ComputedValue {
        evaluate_formula(formula, &EvaluationContext::new(grid))
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(number("=SUM(1,2,3)"), 6.0);
        assert_eq!(number("=SUM({1,2;3,4})"), 10.0);
        assert_eq!(number("=PRODUCT(2,3,4)"), 24.0);
        assert_eq!(number("=SUMSQ(3,4)"), 25.0);
        assert_eq!(number("=SUMPRODUCT({1,2,3},{4,5,6})"), 32.0);
        assert_eq!(error("=SUMPRODUCT({1,2},{1,2,3})"), CellError::Value);

        // Empty input sums to positive zero
        for formula in ["=SUM(A1:A3)", "=SUMSQ(A1:A3)", "=SUM(\"x\")"] {
            let sum = number(formula);
            assert!(sum == 0.0 && sum.is_sign_positive(), "{} gave {}", formula, sum);
        }
    }

    #[test]
    fn test_conditional_sums() {
        let grid = sample_grid();
        assert_eq!(eval_in(&grid, "=SUMIF(A1:A5,\">2\")"), ComputedValue::Number(12.0));
        assert_eq!(eval_in(&grid, "=SUMIF(B1:B5,\"apple\",C1:C5)"), ComputedValue::Number(90.0));
        assert_eq!(
            eval_in(&grid, "=SUMIFS(C1:C5,B1:B5,\"apple\",A1:A5,\">1\")"),
            ComputedValue::Number(80.0)
        );
        assert_eq!(
            eval_in(&grid, "=SUMIFS(C1:C5,B1:B5)"),
            ComputedValue::Error(CellError::Generic)
        );
        // Shortest range bounds the walk
        assert_eq!(
            eval_in(&grid, "=SUMIFS(C1:C5,A1:A2,\">0\")"),
            ComputedValue::Number(30.0)
        );
    }

    #[test]
    fn test_rounding() {
        assert_eq!(number("=ROUND(2.5)"), 3.0);
        assert_eq!(number("=ROUND(-2.5)"), -3.0);
        assert_eq!(number("=ROUND(3.14159,2)"), 3.14);
        assert_eq!(number("=ROUND(1234,-2)"), 1200.0);
        assert_eq!(number("=ROUNDUP(3.21,1)"), 3.3);
        assert_eq!(number("=ROUNDDOWN(-3.29,1)"), -3.2);
        assert_eq!(number("=TRUNC(-4.7)"), -4.0);
        assert_eq!(number("=INT(-4.2)"), -5.0);
        assert_eq!(number("=CEILING(4.2)"), 5.0);
        assert_eq!(number("=CEILING(22,5)"), 25.0);
        assert_eq!(number("=FLOOR(22,5)"), 20.0);
        assert_eq!(number("=MROUND(10,3)"), 9.0);
        assert_eq!(number("=MROUND(10,0)"), 0.0);
        assert_eq!(number("=EVEN(1.5)"), 2.0);
        assert_eq!(number("=EVEN(-3)"), -4.0);
        assert_eq!(number("=ODD(2)"), 3.0);
        assert_eq!(number("=ODD(-1.5)"), -3.0);
        assert_eq!(number("=ODD(0)"), 1.0);
        assert_eq!(error("=ROUND(1.5,-1e30)"), CellError::Num);
        assert_eq!(error("=ROUNDUP(1.5,1e30)"), CellError::Num);
    }

    #[test]
    fn test_arithmetic_functions() {
        assert_eq!(number("=ABS(-3)"), 3.0);
        assert_eq!(number("=SIGN(-0.5)"), -1.0);
        assert_eq!(number("=SQRT(16)"), 4.0);
        assert_eq!(error("=SQRT(-1)"), CellError::Num);
        assert_eq!(number("=POWER(2,8)"), 256.0);
        assert_eq!(number("=MOD(-3,2)"), 1.0);
        assert_eq!(error("=MOD(1,0)"), CellError::Div0);
        assert_eq!(number("=QUOTIENT(-7,2)"), -3.0);
        assert!((number("=LOG(8,2)") - 3.0).abs() < 1e-12);
        assert_eq!(number("=LOG10(1000)"), 3.0);
        assert_eq!(error("=LN(0)"), CellError::Num);
        assert_eq!(number("=FACT(5)"), 120.0);
        assert_eq!(error("=FACT(-1)"), CellError::Num);
        assert_eq!(number("=GCD(12,18)"), 6.0);
        assert_eq!(number("=LCM(4,6)"), 12.0);
        assert_eq!(error("=ABS(\"x\")"), CellError::Value);
    }

    #[test]
    fn test_trig() {
        assert!((number("=DEGREES(PI())") - 180.0).abs() < 1e-9);
        assert!((number("=SIN(RADIANS(30))") - 0.5).abs() < 1e-12);
        assert_eq!(error("=ASIN(2)"), CellError::Num);
        assert_eq!(error("=ATAN2(0,0)"), CellError::Div0);
    }

    #[test]
    fn test_random() {
        let r = number("=RAND()");
        assert!((0.0..1.0).contains(&r));
        let n = number("=RANDBETWEEN(3,5)");
        assert!((3.0..=5.0).contains(&n) && n.fract() == 0.0);
        assert_eq!(error("=RANDBETWEEN(5,3)"), CellError::Num);
    }
}
