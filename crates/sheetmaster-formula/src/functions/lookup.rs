//! Lookup functions
//!
//! Every lookup is an exact match. The approximate-match flags of VLOOKUP,
//! HLOOKUP and MATCH are accepted but do not change the search.

use super::{cells_of, guarded, number_arg, opt_number_arg, scalar};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use sheetmaster_core::{parse_number, CellError};
use std::borrow::Cow;

fn values_equal(a: &FormulaValue, b: &FormulaValue) -> bool {
    match (a, b) {
        (FormulaValue::Number(x), FormulaValue::Number(y)) => x == y,
        (FormulaValue::Boolean(x), FormulaValue::Boolean(y)) => x == y,
        (FormulaValue::String(x), FormulaValue::String(y)) => x.to_lowercase() == y.to_lowercase(),

        // Numeric text matches the number it spells
        (FormulaValue::Number(x), FormulaValue::String(s))
        | (FormulaValue::String(s), FormulaValue::Number(x)) => parse_number(s) == Some(*x),

        (FormulaValue::Empty, FormulaValue::Empty) => true,
        (FormulaValue::Empty, FormulaValue::String(s))
        | (FormulaValue::String(s), FormulaValue::Empty) => s.is_empty(),

        _ => false,
    }
}

/// View an argument as a table; a scalar is a 1x1 table
fn as_table(value: &FormulaValue) -> Result<Cow<'_, [Vec<FormulaValue>]>, CellError> {
    match value {
        FormulaValue::Array(rows) => Ok(Cow::Borrowed(rows.as_slice())),
        FormulaValue::Error(e) => Err(*e),
        other => Ok(Cow::Owned(vec![vec![other.clone()]])),
    }
}

fn table_dims(table: &[Vec<FormulaValue>]) -> (usize, usize) {
    let rows = table.len();
    let cols = table.first().map_or(0, |r| r.len());
    (rows, cols)
}

/// The value being looked up; must be a single non-error value
fn lookup_value(args: &[FormulaValue]) -> Result<&FormulaValue, CellError> {
    let value = scalar(&args[0])?;
    if let FormulaValue::Error(e) = value {
        return Err(*e);
    }
    Ok(value)
}

/// 1-based position argument, `#VALUE!` below 1
fn position_arg(args: &[FormulaValue], index: usize) -> Result<usize, CellError> {
    let n = number_arg(args, index)?.trunc();
    if n < 1.0 {
        return Err(CellError::Value);
    }
    Ok(n as usize)
}

/// Reject an error passed as the optional match flag
fn check_flag(args: &[FormulaValue], index: usize) -> Result<(), CellError> {
    match args.get(index) {
        Some(FormulaValue::Error(e)) => Err(*e),
        _ => Ok(()),
    }
}

/// VLOOKUP(lookup_value, table_array, col_index_num, [range_lookup])
pub fn fn_vlookup(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let needle = lookup_value(args)?;
        let table = as_table(&args[1])?;
        let col = position_arg(args, 2)?;
        check_flag(args, 3)?;

        let (rows, cols) = table_dims(&table);
        if col > cols {
            return Err(CellError::Ref);
        }
        if rows == 0 {
            return Err(CellError::Na);
        }

        table
            .iter()
            .find(|row| row.first().map_or(false, |key| values_equal(needle, key)))
            .map(|row| row.get(col - 1).cloned().unwrap_or(FormulaValue::Empty))
            .ok_or(CellError::Na)
    })
}

/// HLOOKUP(lookup_value, table_array, row_index_num, [range_lookup])
pub fn fn_hlookup(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let needle = lookup_value(args)?;
        let table = as_table(&args[1])?;
        let row = position_arg(args, 2)?;
        check_flag(args, 3)?;

        let (rows, cols) = table_dims(&table);
        if row > rows {
            return Err(CellError::Ref);
        }
        if cols == 0 {
            return Err(CellError::Na);
        }

        (0..cols)
            .find(|&c| values_equal(needle, &table[0][c]))
            .map(|c| table[row - 1].get(c).cloned().unwrap_or(FormulaValue::Empty))
            .ok_or(CellError::Na)
    })
}

/// INDEX(array, row_num, [column_num])
///
/// With only a row number, a single-row array is indexed by column.
pub fn fn_index(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let table = as_table(&args[0])?;
        let (rows, cols) = table_dims(&table);

        let first = number_arg(args, 1)?.trunc();
        let second = opt_number_arg(args, 2, 1.0)?.trunc();
        if first < 1.0 || second < 1.0 {
            return Err(CellError::Ref);
        }
        let (first, second) = (first as usize, second as usize);

        let (row, col) = if args.len() == 2 && rows == 1 {
            (1, first)
        } else {
            (first, second)
        };

        if row > rows || col > cols {
            return Err(CellError::Ref);
        }
        Ok(table[row - 1].get(col - 1).cloned().unwrap_or(FormulaValue::Empty))
    })
}

/// MATCH(lookup_value, lookup_array, [match_type]) - 1-based position in a vector
pub fn fn_match(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let needle = lookup_value(args)?;
        let table = as_table(&args[1])?;
        check_flag(args, 2)?;

        let (rows, cols) = table_dims(&table);
        if rows != 1 && cols != 1 {
            return Err(CellError::Na);
        }

        cells_of(&args[1])
            .into_iter()
            .position(|candidate| values_equal(needle, candidate))
            .map(|i| FormulaValue::Number((i + 1) as f64))
            .ok_or(CellError::Na)
    })
}

/// LOOKUP(lookup_value, lookup_vector, [result_vector])
pub fn fn_lookup(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let needle = lookup_value(args)?;
        if let FormulaValue::Error(e) = &args[1] {
            return Err(*e);
        }
        let keys = cells_of(&args[1]);
        let results = match args.get(2) {
            Some(FormulaValue::Error(e)) => return Err(*e),
            Some(values) => cells_of(values),
            None => keys.clone(),
        };

        keys.iter()
            .zip(results.iter())
            .find(|(key, _)| values_equal(needle, key))
            .map(|(_, result)| (*result).clone())
            .ok_or(CellError::Na)
    })
}

/// ROWS(array)
pub fn fn_rows(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Number(table_dims(&as_table(&args[0])?).0 as f64)))
}

/// COLUMNS(array)
pub fn fn_columns(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Number(table_dims(&as_table(&args[0])?).1 as f64)))
}

#[cfg(test)]
mod tests {
    use crate::evaluator::{evaluate_formula, EvaluationContext};
    use pretty_assertions::assert_eq;
    use sheetmaster_core::{CellAddress, CellError, ComputedValue, Grid};

    /// A1:C4 = id, name, price
    fn grid() -> Grid {
        let rows = [
            ["id", "name", "price"],
            ["1", "apple", "0.5"],
            ["2", "Banana", "0.25"],
            ["3", "cherry", "3"],
        ];
        let mut grid = Grid::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                grid.set_value(CellAddress::new(r as u32, c as u16), *value).unwrap();
            }
        }
        grid
    }

    fn eval(formula: &str) -> ComputedValue {
        let grid = grid();
        evaluate_formula(formula, &EvaluationContext::new(&grid))
    }

    fn text(s: &str) -> ComputedValue {
        ComputedValue::Text(s.to_string())
    }

    fn number(n: f64) -> ComputedValue {
        ComputedValue::Number(n)
    }

    #[test]
    fn test_vlookup() {
        assert_eq!(eval("=VLOOKUP(2,A2:C4,2)"), text("Banana"));
        assert_eq!(eval("=VLOOKUP(\"3\",A2:C4,3,FALSE)"), number(3.0));
        assert_eq!(eval("=VLOOKUP(9,A2:C4,2)"), ComputedValue::Error(CellError::Na));
        assert_eq!(eval("=VLOOKUP(1,A2:C4,4)"), ComputedValue::Error(CellError::Ref));
        assert_eq!(eval("=VLOOKUP(1,A2:C4,0)"), ComputedValue::Error(CellError::Value));
        assert_eq!(eval("=VLOOKUP(1/0,A2:C4,2)"), ComputedValue::Error(CellError::Div0));
    }

    #[test]
    fn test_hlookup() {
        assert_eq!(eval("=HLOOKUP(\"name\",A1:C4,3)"), text("Banana"));
        assert_eq!(eval("=HLOOKUP(\"PRICE\",A1:C4,2)"), number(0.5));
        assert_eq!(eval("=HLOOKUP(\"weight\",A1:C4,2)"), ComputedValue::Error(CellError::Na));
        assert_eq!(eval("=HLOOKUP(\"name\",A1:C4,5)"), ComputedValue::Error(CellError::Ref));
    }

    #[test]
    fn test_index() {
        assert_eq!(eval("=INDEX(A1:C4,3,2)"), text("Banana"));
        assert_eq!(eval("=INDEX(B1:B4,4)"), text("cherry"));
        assert_eq!(eval("=INDEX(A1:C1,3)"), text("price"));
        assert_eq!(eval("=INDEX(A1:C4,5,1)"), ComputedValue::Error(CellError::Ref));
        assert_eq!(eval("=INDEX(A1:C4,1,4)"), ComputedValue::Error(CellError::Ref));
    }

    #[test]
    fn test_match() {
        assert_eq!(eval("=MATCH(\"cherry\",B1:B4,0)"), number(4.0));
        assert_eq!(eval("=MATCH(\"price\",A1:C1)"), number(3.0));
        assert_eq!(eval("=MATCH(\"kiwi\",B1:B4,0)"), ComputedValue::Error(CellError::Na));
        assert_eq!(eval("=MATCH(1,A1:C4,0)"), ComputedValue::Error(CellError::Na));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(eval("=LOOKUP(\"apple\",B2:B4,C2:C4)"), number(0.5));
        assert_eq!(eval("=LOOKUP(3,A2:A4)"), number(3.0));
        assert_eq!(eval("=LOOKUP(\"kiwi\",B2:B4,C2:C4)"), ComputedValue::Error(CellError::Na));
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(eval("=ROWS(A1:C4)"), number(4.0));
        assert_eq!(eval("=COLUMNS(A1:C4)"), number(3.0));
        assert_eq!(eval("=ROWS(5)"), number(1.0));
    }
}
