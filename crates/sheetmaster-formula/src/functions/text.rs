//! Text functions

use super::{flatten, guarded, number_arg, opt_number_arg, scalar, text_arg, to_bool, to_number};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use sheetmaster_core::{parse_number, CellError};

/// Longest string REPT will build
const MAX_TEXT_LENGTH: usize = 32_767;

fn take_left(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn take_right(s: &str, n: usize) -> String {
    let len = s.chars().count();
    if n >= len {
        return s.to_string();
    }
    s.chars().skip(len - n).collect()
}

/// Non-negative character count argument, defaulting to 1
fn count_arg(args: &[FormulaValue], index: usize) -> Result<usize, CellError> {
    let n = opt_number_arg(args, index, 1.0)?.trunc();
    if n < 0.0 {
        return Err(CellError::Value);
    }
    Ok(n as usize)
}

/// CONCAT(value1, ...) / CONCATENATE(value1, ...)
pub fn fn_concat(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let mut out = String::new();
        for value in flatten(args) {
            if let FormulaValue::Error(e) = value {
                return Err(*e);
            }
            out.push_str(&value.as_string());
        }
        Ok(FormulaValue::String(out))
    })
}

/// TEXTJOIN(delimiter, ignore_empty, value1, ...)
pub fn fn_textjoin(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let delimiter = text_arg(args, 0)?;
        let ignore_empty = to_bool(&args[1])?;

        let mut parts = Vec::new();
        for value in flatten(&args[2..]) {
            if let FormulaValue::Error(e) = value {
                return Err(*e);
            }
            let text = value.as_string();
            if ignore_empty && text.is_empty() {
                continue;
            }
            parts.push(text);
        }
        Ok(FormulaValue::String(parts.join(&delimiter)))
    })
}

/// UPPER(text)
pub fn fn_upper(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::String(text_arg(args, 0)?.to_uppercase())))
}

/// LOWER(text)
pub fn fn_lower(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::String(text_arg(args, 0)?.to_lowercase())))
}

/// PROPER(text) - capitalize the first letter of each word
pub fn fn_proper(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let text = text_arg(args, 0)?;
        let mut out = String::with_capacity(text.len());
        let mut word_start = true;
        for c in text.chars() {
            if c.is_alphabetic() {
                if word_start {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                word_start = false;
            } else {
                out.push(c);
                word_start = true;
            }
        }
        Ok(FormulaValue::String(out))
    })
}

/// TRIM(text) - strip outer spaces and collapse inner runs to one
pub fn fn_trim(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let text = text_arg(args, 0)?;
        let trimmed: Vec<&str> = text.split(' ').filter(|part| !part.is_empty()).collect();
        Ok(FormulaValue::String(trimmed.join(" ")))
    })
}

/// CLEAN(text) - drop non-printable control characters
pub fn fn_clean(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let text = text_arg(args, 0)?;
        Ok(FormulaValue::String(text.chars().filter(|c| (*c as u32) >= 0x20).collect()))
    })
}

/// LEFT(text, [num_chars])
pub fn fn_left(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let text = text_arg(args, 0)?;
        let n = count_arg(args, 1)?;
        Ok(FormulaValue::String(take_left(&text, n)))
    })
}

/// RIGHT(text, [num_chars])
pub fn fn_right(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let text = text_arg(args, 0)?;
        let n = count_arg(args, 1)?;
        Ok(FormulaValue::String(take_right(&text, n)))
    })
}

/// MID(text, start_num, num_chars)
pub fn fn_mid(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let text = text_arg(args, 0)?;
        let start = number_arg(args, 1)?.trunc();
        let n = number_arg(args, 2)?.trunc();
        if start < 1.0 || n < 0.0 {
            return Err(CellError::Value);
        }
        let mid = text.chars().skip(start as usize - 1).take(n as usize).collect();
        Ok(FormulaValue::String(mid))
    })
}

/// LEN(text)
pub fn fn_len(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Number(text_arg(args, 0)?.chars().count() as f64)))
}

/// 0-based character offset to start searching from, validated against the text
fn start_offset(args: &[FormulaValue], index: usize, text_len: usize) -> Result<usize, CellError> {
    let start = opt_number_arg(args, index, 1.0)?.trunc();
    if start < 1.0 || start > (text_len + 1) as f64 {
        return Err(CellError::Value);
    }
    Ok(start as usize - 1)
}

/// FIND(find_text, within_text, [start_num]) - case-sensitive
pub fn fn_find(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let needle: Vec<char> = text_arg(args, 0)?.chars().collect();
        let haystack: Vec<char> = text_arg(args, 1)?.chars().collect();
        let start = start_offset(args, 2, haystack.len())?;

        if needle.is_empty() {
            return Ok(FormulaValue::Number((start + 1) as f64));
        }

        (start..haystack.len())
            .find(|&i| haystack[i..].starts_with(&needle))
            .map(|i| FormulaValue::Number((i + 1) as f64))
            .ok_or(CellError::Value)
    })
}

/// SEARCH(find_text, within_text, [start_num]) - case-insensitive, `*` and `?` wildcards
pub fn fn_search(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let pattern: Vec<char> = text_arg(args, 0)?.to_lowercase().chars().collect();
        let haystack: Vec<char> = text_arg(args, 1)?.to_lowercase().chars().collect();
        let start = start_offset(args, 2, haystack.len())?;

        (start..=haystack.len())
            .find(|&i| wildcard_prefix_match(&pattern, &haystack[i..]))
            .filter(|&i| i < haystack.len() || pattern.is_empty())
            .map(|i| FormulaValue::Number((i + 1) as f64))
            .ok_or(CellError::Value)
    })
}

/// True when `pattern` matches some prefix of `text`
///
/// Greedy matcher with single-star backtracking; the pattern is implicitly
/// followed by `*`, so any trailing text is accepted.
fn wildcard_prefix_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    loop {
        if p == pattern.len() {
            return true;
        }
        match pattern[p] {
            '*' => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            c if t < text.len() && (c == '?' || c == text[t]) => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((star_p, star_t)) if star_t < text.len() => {
                star = Some((star_p, star_t + 1));
                p = star_p + 1;
                t = star_t + 1;
            }
            _ => return false,
        }
    }
}

/// SUBSTITUTE(text, old_text, new_text, [instance_num])
pub fn fn_substitute(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let text = text_arg(args, 0)?;
        let old = text_arg(args, 1)?;
        let new = text_arg(args, 2)?;

        if old.is_empty() {
            return Ok(FormulaValue::String(text));
        }

        let Some(instance) = args.get(3) else {
            return Ok(FormulaValue::String(text.replace(&old, &new)));
        };

        let instance = to_number(instance)?.trunc();
        if instance < 1.0 {
            return Err(CellError::Value);
        }

        let replaced = match text.match_indices(&old).nth(instance as usize - 1) {
            Some((pos, _)) => format!("{}{}{}", &text[..pos], new, &text[pos + old.len()..]),
            None => text,
        };
        Ok(FormulaValue::String(replaced))
    })
}

/// REPT(text, number_times)
pub fn fn_rept(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let text = text_arg(args, 0)?;
        let times = number_arg(args, 1)?.trunc();
        if times < 0.0 || text.len() as f64 * times > MAX_TEXT_LENGTH as f64 {
            return Err(CellError::Value);
        }
        Ok(FormulaValue::String(text.repeat(times as usize)))
    })
}

/// EXACT(text1, text2) - case-sensitive comparison
pub fn fn_exact(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Boolean(text_arg(args, 0)? == text_arg(args, 1)?)))
}

/// TEXT(value, format_text)
///
/// Supports the numeric subset of format codes: decimal places are the `0`/`#`
/// placeholders after `.`, a `,` before the decimal point groups thousands, and
/// a trailing `%` scales by 100.
pub fn fn_text(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let mut value = number_arg(args, 0)?;
        let format = text_arg(args, 1)?;

        let percent = format.trim_end().ends_with('%');
        if percent {
            value *= 100.0;
        }

        let (integer_part, fraction_part) = match format.split_once('.') {
            Some((int, frac)) => (int, frac),
            None => (format.as_str(), ""),
        };
        let decimals = fraction_part.chars().filter(|c| matches!(c, '0' | '#')).count();
        let grouped = integer_part.contains(',');

        let mut out = format!("{:.*}", decimals, value);
        if grouped {
            out = group_thousands(&out);
        }
        if percent {
            out.push('%');
        }
        Ok(FormulaValue::String(out))
    })
}

fn group_thousands(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int, frac) = match unsigned.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    match frac {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// VALUE(text)
pub fn fn_value(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| match scalar(&args[0])? {
        FormulaValue::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaValue::String(s) => parse_number(s).map(FormulaValue::Number).ok_or(CellError::Value),
        _ => Err(CellError::Value),
    })
}

/// CHAR(number) - character for a code between 1 and 255
pub fn fn_char(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let code = number_arg(args, 0)?.trunc();
        if !(1.0..=255.0).contains(&code) {
            return Err(CellError::Value);
        }
        char::from_u32(code as u32)
            .map(|c| FormulaValue::String(c.to_string()))
            .ok_or(CellError::Value)
    })
}

/// CODE(text) - code of the first character
pub fn fn_code(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        text_arg(args, 0)?
            .chars()
            .next()
            .map(|c| FormulaValue::Number(c as u32 as f64))
            .ok_or(CellError::Value)
    })
}

#[cfg(test)]
mod tests {
    use super::wildcard_prefix_match;
    use crate::evaluator::{evaluate_formula, EvaluationContext};
    use pretty_assertions::assert_eq;
    use sheetmaster_core::{CellAddress, CellError, ComputedValue, Grid};

    fn eval(formula: &str) -> ComputedValue {
        evaluate_formula(formula, &EvaluationContext::simple())
    }

    fn text(s: &str) -> ComputedValue {
        ComputedValue::Text(s.to_string())
    }

    fn number(n: f64) -> ComputedValue {
        ComputedValue::Number(n)
    }

    #[test]
    fn test_concat_and_join() {
        assert_eq!(eval("=CONCAT(\"a\",1,TRUE)"), text("a1TRUE"));
        assert_eq!(eval("=CONCATENATE(\"x\",{1,2})"), text("x12"));
        assert_eq!(eval("=CONCAT(\"a\",1/0)"), ComputedValue::Error(CellError::Div0));
        assert_eq!(eval("=TEXTJOIN(\"-\",TRUE,\"a\",\"\",\"b\")"), text("a-b"));
        assert_eq!(eval("=TEXTJOIN(\"-\",FALSE,\"a\",\"\",\"b\")"), text("a--b"));
    }

    #[test]
    fn test_textjoin_over_range() {
        let mut grid = Grid::new();
        grid.set_value(CellAddress::new(0, 0), "x").unwrap();
        grid.set_value(CellAddress::new(2, 0), "z").unwrap();
        let ctx = EvaluationContext::new(&grid);
        assert_eq!(evaluate_formula("=TEXTJOIN(\",\",TRUE,A1:A3)", &ctx), text("x,z"));
    }

    #[test]
    fn test_case_functions() {
        assert_eq!(eval("=UPPER(\"abc\")"), text("ABC"));
        assert_eq!(eval("=LOWER(\"AbC\")"), text("abc"));
        assert_eq!(eval("=PROPER(\"hello wORLD-wide\")"), text("Hello World-Wide"));
    }

    #[test]
    fn test_trim_and_clean() {
        assert_eq!(eval("=TRIM(\"  a   b  \")"), text("a b"));
        assert_eq!(eval("=CLEAN(CONCAT(\"a\",CHAR(9),\"b\"))"), text("ab"));
    }

    #[test]
    fn test_substrings() {
        assert_eq!(eval("=LEFT(\"hello\",2)"), text("he"));
        assert_eq!(eval("=LEFT(\"hello\")"), text("h"));
        assert_eq!(eval("=RIGHT(\"hello\",3)"), text("llo"));
        assert_eq!(eval("=RIGHT(\"hi\",10)"), text("hi"));
        assert_eq!(eval("=LEFT(\"hi\",-1)"), ComputedValue::Error(CellError::Value));
        assert_eq!(eval("=MID(\"spreadsheet\",7,5)"), text("sheet"));
        assert_eq!(eval("=MID(\"abc\",0,1)"), ComputedValue::Error(CellError::Value));
        assert_eq!(eval("=LEN(\"héllo\")"), number(5.0));
        assert_eq!(eval("=LEN(12.5)"), number(4.0));
    }

    #[test]
    fn test_find_and_search() {
        assert_eq!(eval("=FIND(\"b\",\"abcb\")"), number(2.0));
        assert_eq!(eval("=FIND(\"b\",\"abcb\",3)"), number(4.0));
        assert_eq!(eval("=FIND(\"B\",\"abc\")"), ComputedValue::Error(CellError::Value));
        assert_eq!(eval("=SEARCH(\"B\",\"abc\")"), number(2.0));
        assert_eq!(eval("=SEARCH(\"c?d\",\"abcxde\")"), number(3.0));
        assert_eq!(eval("=SEARCH(\"b*e\",\"abcde\")"), number(2.0));
        assert_eq!(eval("=SEARCH(\"z\",\"abc\")"), ComputedValue::Error(CellError::Value));
    }

    #[test]
    fn test_wildcards() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert!(wildcard_prefix_match(&chars("a*c"), &chars("abbbcx")));
        assert!(wildcard_prefix_match(&chars("*"), &chars("")));
        assert!(!wildcard_prefix_match(&chars("a?c"), &chars("ac")));
    }

    #[test]
    fn test_substitute_and_rept() {
        assert_eq!(eval("=SUBSTITUTE(\"a-b-c\",\"-\",\"+\")"), text("a+b+c"));
        assert_eq!(eval("=SUBSTITUTE(\"a-b-c\",\"-\",\"+\",2)"), text("a-b+c"));
        assert_eq!(eval("=SUBSTITUTE(\"a-b-c\",\"-\",\"+\",5)"), text("a-b-c"));
        assert_eq!(eval("=REPT(\"ab\",3)"), text("ababab"));
        assert_eq!(eval("=REPT(\"ab\",-1)"), ComputedValue::Error(CellError::Value));
        assert_eq!(eval("=EXACT(\"a\",\"A\")"), ComputedValue::Boolean(false));
        assert_eq!(eval("=EXACT(\"a\",\"a\")"), ComputedValue::Boolean(true));
    }

    #[test]
    fn test_text_format() {
        assert_eq!(eval("=TEXT(3.14159,\"0.00\")"), text("3.14"));
        assert_eq!(eval("=TEXT(1234567.891,\"#,##0.00\")"), text("1,234,567.89"));
        assert_eq!(eval("=TEXT(0.256,\"0.0%\")"), text("25.6%"));
        assert_eq!(eval("=TEXT(-1234,\"#,##0\")"), text("-1,234"));
        assert_eq!(eval("=TEXT(\"abc\",\"0\")"), ComputedValue::Error(CellError::Value));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(eval("=VALUE(\"42.5\")"), number(42.5));
        assert_eq!(eval("=VALUE(\"abc\")"), ComputedValue::Error(CellError::Value));
        assert_eq!(eval("=CHAR(65)"), text("A"));
        assert_eq!(eval("=CHAR(0)"), ComputedValue::Error(CellError::Value));
        assert_eq!(eval("=CODE(\"A\")"), number(65.0));
        assert_eq!(eval("=CODE(\"\")"), ComputedValue::Error(CellError::Value));
    }
}
