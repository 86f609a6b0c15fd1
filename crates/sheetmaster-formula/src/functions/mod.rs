//! Built-in spreadsheet functions

pub mod criteria;
pub mod date;
pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod statistical;
pub mod text;

use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use ahash::AHashMap;
use sheetmaster_core::{parse_number, CellError};

/// Function implementation signature
///
/// Functions receive eagerly evaluated arguments; a failed argument arrives as
/// a [`FormulaValue::Error`].
pub type FunctionImpl = fn(&[FormulaValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
    /// Is volatile (recalculates every time)
    pub volatile: bool,
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        registry.register_math_functions();
        registry.register_statistical_functions();
        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_date_functions();
        registry.register_lookup_functions();
        registry.register_info_functions();

        registry
    }

    /// Look up a function by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.to_uppercase().as_str())
    }

    /// Check whether a function must be re-evaluated on every recompute
    pub fn is_volatile(&self, name: &str) -> bool {
        self.get(name).map_or(false, |f| f.volatile)
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name, def);
    }

    fn add(&mut self, name: &'static str, min_args: usize, max_args: Option<usize>, implementation: FunctionImpl) {
        self.register(FunctionDef {
            name,
            min_args,
            max_args,
            implementation,
            volatile: false,
        });
    }

    fn add_volatile(&mut self, name: &'static str, min_args: usize, max_args: Option<usize>, implementation: FunctionImpl) {
        self.register(FunctionDef {
            name,
            min_args,
            max_args,
            implementation,
            volatile: true,
        });
    }

    fn register_math_functions(&mut self) {
        self.add("SUM", 1, None, math::fn_sum);
        self.add("PRODUCT", 1, None, math::fn_product);
        self.add("SUMSQ", 1, None, math::fn_sumsq);
        self.add("SUMPRODUCT", 1, None, math::fn_sumproduct);
        self.add("SUMIF", 2, Some(3), math::fn_sumif);
        self.add("SUMIFS", 3, None, math::fn_sumifs);

        self.add("ROUND", 1, Some(2), math::fn_round);
        self.add("ROUNDUP", 1, Some(2), math::fn_roundup);
        self.add("ROUNDDOWN", 1, Some(2), math::fn_rounddown);
        self.add("CEILING", 1, Some(2), math::fn_ceiling);
        self.add("FLOOR", 1, Some(2), math::fn_floor);
        self.add("MROUND", 2, Some(2), math::fn_mround);
        self.add("INT", 1, Some(1), math::fn_int);
        self.add("TRUNC", 1, Some(2), math::fn_trunc);
        self.add("EVEN", 1, Some(1), math::fn_even);
        self.add("ODD", 1, Some(1), math::fn_odd);

        self.add("ABS", 1, Some(1), math::fn_abs);
        self.add("SIGN", 1, Some(1), math::fn_sign);
        self.add("SQRT", 1, Some(1), math::fn_sqrt);
        self.add("POWER", 2, Some(2), math::fn_power);
        self.add("MOD", 2, Some(2), math::fn_mod);
        self.add("QUOTIENT", 2, Some(2), math::fn_quotient);
        self.add("EXP", 1, Some(1), math::fn_exp);
        self.add("LN", 1, Some(1), math::fn_ln);
        self.add("LOG", 1, Some(2), math::fn_log);
        self.add("LOG10", 1, Some(1), math::fn_log10);
        self.add("FACT", 1, Some(1), math::fn_fact);
        self.add("GCD", 1, None, math::fn_gcd);
        self.add("LCM", 1, None, math::fn_lcm);

        self.add("PI", 0, Some(0), math::fn_pi);
        self.add("RADIANS", 1, Some(1), math::fn_radians);
        self.add("DEGREES", 1, Some(1), math::fn_degrees);
        self.add("SIN", 1, Some(1), math::fn_sin);
        self.add("COS", 1, Some(1), math::fn_cos);
        self.add("TAN", 1, Some(1), math::fn_tan);
        self.add("ASIN", 1, Some(1), math::fn_asin);
        self.add("ACOS", 1, Some(1), math::fn_acos);
        self.add("ATAN", 1, Some(1), math::fn_atan);
        self.add("ATAN2", 2, Some(2), math::fn_atan2);
        self.add("SINH", 1, Some(1), math::fn_sinh);
        self.add("COSH", 1, Some(1), math::fn_cosh);
        self.add("TANH", 1, Some(1), math::fn_tanh);

        self.add_volatile("RAND", 0, Some(0), math::fn_rand);
        self.add_volatile("RANDBETWEEN", 2, Some(2), math::fn_randbetween);
    }

    fn register_statistical_functions(&mut self) {
        self.add("AVERAGE", 1, None, statistical::fn_average);
        self.add("MAX", 1, None, statistical::fn_max);
        self.add("MIN", 1, None, statistical::fn_min);
        self.add("COUNT", 1, None, statistical::fn_count);
        self.add("COUNTA", 1, None, statistical::fn_counta);
        self.add("COUNTBLANK", 1, Some(1), statistical::fn_countblank);
        self.add("MEDIAN", 1, None, statistical::fn_median);
        self.add("MODE", 1, None, statistical::fn_mode);
        self.add("STDEV", 1, None, statistical::fn_stdev);
        self.add("VAR", 1, None, statistical::fn_var);
        self.add("LARGE", 2, Some(2), statistical::fn_large);
        self.add("SMALL", 2, Some(2), statistical::fn_small);
        self.add("PERCENTILE", 2, Some(2), statistical::fn_percentile);
        self.add("PERCENTRANK", 2, Some(2), statistical::fn_percentrank);
        self.add("RANK", 2, Some(3), statistical::fn_rank);
        self.add("SUBTOTAL", 2, None, statistical::fn_subtotal);
        self.add("COUNTIF", 2, Some(2), statistical::fn_countif);
        self.add("COUNTIFS", 2, None, statistical::fn_countifs);
        self.add("AVERAGEIF", 2, Some(3), statistical::fn_averageif);
        self.add("AVERAGEIFS", 3, None, statistical::fn_averageifs);
    }

    fn register_logical_functions(&mut self) {
        self.add("IF", 2, Some(3), logical::fn_if);
        self.add("IFS", 2, None, logical::fn_ifs);
        self.add("AND", 1, None, logical::fn_and);
        self.add("OR", 1, None, logical::fn_or);
        self.add("NOT", 1, Some(1), logical::fn_not);
        self.add("XOR", 1, None, logical::fn_xor);
        self.add("SWITCH", 3, None, logical::fn_switch);
        self.add("IFERROR", 2, Some(2), logical::fn_iferror);
        self.add("IFNA", 2, Some(2), logical::fn_ifna);
        self.add("CHOOSE", 2, None, logical::fn_choose);
        self.add("TRUE", 0, Some(0), logical::fn_true);
        self.add("FALSE", 0, Some(0), logical::fn_false);
    }

    fn register_text_functions(&mut self) {
        self.add("CONCAT", 1, None, text::fn_concat);
        self.add("CONCATENATE", 1, None, text::fn_concat);
        self.add("TEXTJOIN", 3, None, text::fn_textjoin);
        self.add("UPPER", 1, Some(1), text::fn_upper);
        self.add("LOWER", 1, Some(1), text::fn_lower);
        self.add("PROPER", 1, Some(1), text::fn_proper);
        self.add("TRIM", 1, Some(1), text::fn_trim);
        self.add("CLEAN", 1, Some(1), text::fn_clean);
        self.add("LEFT", 1, Some(2), text::fn_left);
        self.add("RIGHT", 1, Some(2), text::fn_right);
        self.add("MID", 3, Some(3), text::fn_mid);
        self.add("LEN", 1, Some(1), text::fn_len);
        self.add("FIND", 2, Some(3), text::fn_find);
        self.add("SEARCH", 2, Some(3), text::fn_search);
        self.add("SUBSTITUTE", 3, Some(4), text::fn_substitute);
        self.add("REPT", 2, Some(2), text::fn_rept);
        self.add("EXACT", 2, Some(2), text::fn_exact);
        self.add("TEXT", 2, Some(2), text::fn_text);
        self.add("VALUE", 1, Some(1), text::fn_value);
        self.add("CHAR", 1, Some(1), text::fn_char);
        self.add("CODE", 1, Some(1), text::fn_code);
    }

    fn register_date_functions(&mut self) {
        self.add_volatile("TODAY", 0, Some(0), date::fn_today);
        self.add_volatile("NOW", 0, Some(0), date::fn_now);
        self.add("DATE", 3, Some(3), date::fn_date);
        self.add("TIME", 3, Some(3), date::fn_time);
        self.add("YEAR", 1, Some(1), date::fn_year);
        self.add("MONTH", 1, Some(1), date::fn_month);
        self.add("DAY", 1, Some(1), date::fn_day);
        self.add("HOUR", 1, Some(1), date::fn_hour);
        self.add("MINUTE", 1, Some(1), date::fn_minute);
        self.add("SECOND", 1, Some(1), date::fn_second);
        self.add("EDATE", 2, Some(2), date::fn_edate);
        self.add("EOMONTH", 2, Some(2), date::fn_eomonth);
        self.add("DAYS", 2, Some(2), date::fn_days);
        self.add("DATEDIF", 3, Some(3), date::fn_datedif);
        self.add("WEEKDAY", 1, Some(2), date::fn_weekday);
        self.add("WEEKNUM", 1, Some(2), date::fn_weeknum);
        self.add("NETWORKDAYS", 2, None, date::fn_networkdays);
    }

    fn register_lookup_functions(&mut self) {
        self.add("VLOOKUP", 3, Some(4), lookup::fn_vlookup);
        self.add("HLOOKUP", 3, Some(4), lookup::fn_hlookup);
        self.add("INDEX", 2, Some(3), lookup::fn_index);
        self.add("MATCH", 2, Some(3), lookup::fn_match);
        self.add("LOOKUP", 2, Some(3), lookup::fn_lookup);
        self.add("ROWS", 1, Some(1), lookup::fn_rows);
        self.add("COLUMNS", 1, Some(1), lookup::fn_columns);
    }

    fn register_info_functions(&mut self) {
        self.add("ISBLANK", 1, Some(1), info::fn_isblank);
        self.add("ISNUMBER", 1, Some(1), info::fn_isnumber);
        self.add("ISTEXT", 1, Some(1), info::fn_istext);
        self.add("ISERROR", 1, Some(1), info::fn_iserror);
        self.add("ISNA", 1, Some(1), info::fn_isna);
        self.add("ISEVEN", 1, Some(1), info::fn_iseven);
        self.add("ISODD", 1, Some(1), info::fn_isodd);
        self.add("NA", 0, Some(0), info::fn_na);
    }
}

// === Argument helpers shared by the function modules ===

/// Run a function body that reports failures as cell errors
pub(crate) fn guarded(
    body: impl FnOnce() -> Result<FormulaValue, CellError>,
) -> FormulaResult<FormulaValue> {
    Ok(body().unwrap_or_else(FormulaValue::Error))
}

/// A finite number, or `#NUM!`
pub(crate) fn num(n: f64) -> Result<FormulaValue, CellError> {
    if n.is_finite() {
        Ok(FormulaValue::Number(n))
    } else {
        Err(CellError::Num)
    }
}

/// Reduce a value to a single scalar; a 1x1 array counts as its only element
pub(crate) fn scalar(value: &FormulaValue) -> Result<&FormulaValue, CellError> {
    match value {
        FormulaValue::Array(rows) => match rows.as_slice() {
            [row] if row.len() == 1 => Ok(&row[0]),
            _ => Err(CellError::Value),
        },
        FormulaValue::Error(e) => Err(*e),
        other => Ok(other),
    }
}

/// Coerce a scalar to a number: empty is 0, booleans are 1/0, text must parse
pub(crate) fn to_number(value: &FormulaValue) -> Result<f64, CellError> {
    match scalar(value)? {
        FormulaValue::Number(n) => Ok(*n),
        FormulaValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        FormulaValue::Empty => Ok(0.0),
        FormulaValue::String(s) => parse_number(s).ok_or(CellError::Value),
        FormulaValue::Error(e) => Err(*e),
        FormulaValue::Array(_) => Err(CellError::Value),
    }
}

/// Coerce a scalar to text
pub(crate) fn to_text(value: &FormulaValue) -> Result<String, CellError> {
    Ok(scalar(value)?.as_string())
}

/// Coerce a scalar to a boolean
pub(crate) fn to_bool(value: &FormulaValue) -> Result<bool, CellError> {
    scalar(value)?.as_bool().ok_or(CellError::Value)
}

/// Required numeric argument
pub(crate) fn number_arg(args: &[FormulaValue], index: usize) -> Result<f64, CellError> {
    args.get(index).map_or(Err(CellError::Value), to_number)
}

/// Optional numeric argument
pub(crate) fn opt_number_arg(args: &[FormulaValue], index: usize, default: f64) -> Result<f64, CellError> {
    args.get(index).map_or(Ok(default), to_number)
}

/// Required text argument
pub(crate) fn text_arg(args: &[FormulaValue], index: usize) -> Result<String, CellError> {
    args.get(index).map_or(Err(CellError::Value), to_text)
}

/// Iterate over every value in the arguments, expanding arrays row by row
pub(crate) fn flatten<'a>(args: &'a [FormulaValue]) -> impl Iterator<Item = &'a FormulaValue> + 'a {
    args.iter().flat_map(cells_of)
}

/// Row-major cells of an array argument; a scalar is a 1x1 array
pub(crate) fn cells_of(value: &FormulaValue) -> Vec<&FormulaValue> {
    match value {
        FormulaValue::Array(rows) => rows.iter().flatten().collect(),
        other => vec![other],
    }
}

/// Collect the numbers an aggregate consumes
///
/// Inside arrays only numbers count. Direct arguments may also be booleans or
/// numeric text. The first error encountered is returned.
pub(crate) fn collect_numbers(args: &[FormulaValue]) -> Result<Vec<f64>, CellError> {
    let mut numbers = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Array(rows) => {
                for cell in rows.iter().flatten() {
                    match cell {
                        FormulaValue::Number(n) => numbers.push(*n),
                        FormulaValue::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            FormulaValue::Number(n) => numbers.push(*n),
            FormulaValue::Boolean(b) => numbers.push(if *b { 1.0 } else { 0.0 }),
            FormulaValue::String(s) => {
                if let Some(n) = parse_number(s) {
                    numbers.push(n);
                }
            }
            FormulaValue::Error(e) => return Err(*e),
            FormulaValue::Empty => {}
        }
    }
    Ok(numbers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::new();
        assert!(registry.get("sum").is_some());
        assert!(registry.get("Vlookup").is_some());
        assert!(registry.get("NOPE").is_none());
    }

    #[test]
    fn test_volatile_flags() {
        let registry = FunctionRegistry::new();
        for name in ["RAND", "RANDBETWEEN", "TODAY", "NOW"] {
            assert!(registry.is_volatile(name), "{}", name);
        }
        assert!(!registry.is_volatile("SUM"));
    }

    #[test]
    fn test_catalog_is_complete() {
        let registry = FunctionRegistry::new();
        let catalog = [
            "SUM", "AVERAGE", "MAX", "MIN", "COUNT", "COUNTA", "COUNTBLANK", "PRODUCT", "MEDIAN",
            "MODE", "STDEV", "VAR", "SUMSQ", "LARGE", "SMALL", "PERCENTILE", "PERCENTRANK", "RANK",
            "SUBTOTAL", "SUMIF", "SUMIFS", "COUNTIF", "COUNTIFS", "AVERAGEIF", "AVERAGEIFS",
            "SUMPRODUCT", "IF", "IFS", "AND", "OR", "NOT", "XOR", "SWITCH", "IFERROR", "CHOOSE",
            "CONCAT", "CONCATENATE", "UPPER", "LOWER", "PROPER", "TRIM", "LEFT", "RIGHT", "MID",
            "LEN", "FIND", "SEARCH", "SUBSTITUTE", "TEXT", "VALUE", "REPT", "CLEAN", "EXACT",
            "TEXTJOIN", "CHAR", "CODE", "TODAY", "NOW", "YEAR", "MONTH", "DAY", "HOUR", "MINUTE",
            "SECOND", "DATE", "TIME", "EDATE", "EOMONTH", "DAYS", "DATEDIF", "WEEKDAY", "WEEKNUM",
            "NETWORKDAYS", "VLOOKUP", "HLOOKUP", "INDEX", "MATCH", "LOOKUP", "ROUND", "ROUNDUP",
            "ROUNDDOWN", "CEILING", "FLOOR", "SQRT", "POWER", "MOD", "QUOTIENT", "SIGN", "ABS",
            "INT", "TRUNC", "MROUND", "EXP", "LN", "LOG", "LOG10", "FACT", "GCD", "LCM", "EVEN",
            "ODD", "PI", "RADIANS", "DEGREES", "SIN", "COS", "TAN", "RAND", "RANDBETWEEN",
            "ISBLANK", "ISNUMBER", "ISTEXT", "ISERROR", "ISNA", "ISEVEN", "ISODD",
        ];
        for name in catalog {
            assert!(registry.get(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_collect_numbers_rules() {
        let args = vec![
            FormulaValue::Array(vec![vec![
                FormulaValue::Number(1.0),
                FormulaValue::String("x".into()),
                FormulaValue::Boolean(true),
                FormulaValue::Empty,
            ]]),
            FormulaValue::Boolean(true),
            FormulaValue::String("2".into()),
        ];
        assert_eq!(collect_numbers(&args), Ok(vec![1.0, 1.0, 2.0]));

        let args = vec![FormulaValue::Array(vec![vec![FormulaValue::Error(CellError::Na)]])];
        assert_eq!(collect_numbers(&args), Err(CellError::Na));
    }
}
