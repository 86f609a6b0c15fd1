//! Date/time functions
//!
//! Dates travel between cells as ISO text (`YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`,
//! `HH:MM:SS`). Arguments are also accepted as `YYYY/MM/DD`, `MM/DD/YYYY`, bare
//! times, or Excel serial numbers.
//!
//! Notes:
//! - Serial numbers use the 1900 date system, which includes the historical
//!   "1900 leap year" bug: serial 60 is the non-existent 1900-02-29 and is read
//!   as 1900-02-28.

use super::{flatten, guarded, number_arg, opt_number_arg, scalar, text_arg};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use chrono::{
    Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday,
};
use sheetmaster_core::{parse_number, CellError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIME_FORMAT: &str = "%H:%M:%S";

const DATETIME_INPUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];
const DATE_INPUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const TIME_INPUTS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Largest day offset accepted when building dates; keeps chrono durations in range
const MAX_DAY_OFFSET: i64 = 3_000_000;

/// Day zero of the serial system; bare times are anchored here
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 31).unwrap_or(NaiveDate::MIN)
}

/// Convert an Excel 1900-system serial number to a date and time
fn datetime_from_serial(serial: f64) -> Result<NaiveDateTime, CellError> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_DAY_OFFSET as f64 {
        return Err(CellError::Num);
    }

    let mut days = serial.floor() as i64;
    let mut seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    if seconds >= 86_400 {
        days += 1;
        seconds -= 86_400;
    }

    // Serials after the phantom 1900-02-29 are one day ahead of the calendar
    let offset = match days {
        0..=59 => days,
        60 => 59,
        _ => days - 1,
    };

    let date = serial_epoch() + Duration::days(offset);
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds as u32, 0).ok_or(CellError::Num)?;
    Ok(date.and_time(time))
}

fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    for format in DATETIME_INPUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    for format in DATE_INPUTS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_time(NaiveTime::default()));
        }
    }
    for format in TIME_INPUTS {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            return Some(serial_epoch().and_time(time));
        }
    }
    None
}

/// Interpret a value as a date and time
fn parse_datetime(value: &FormulaValue) -> Result<NaiveDateTime, CellError> {
    match scalar(value)? {
        FormulaValue::Number(n) => datetime_from_serial(*n),
        FormulaValue::String(s) => {
            let s = s.trim();
            match parse_date_text(s) {
                Some(dt) => Ok(dt),
                None => parse_number(s).ok_or(CellError::Value).and_then(datetime_from_serial),
            }
        }
        FormulaValue::Error(e) => Err(*e),
        _ => Err(CellError::Value),
    }
}

fn date_arg(args: &[FormulaValue], index: usize) -> Result<NaiveDate, CellError> {
    args.get(index)
        .map_or(Err(CellError::Value), parse_datetime)
        .map(|dt| dt.date())
}

fn datetime_arg(args: &[FormulaValue], index: usize) -> Result<NaiveDateTime, CellError> {
    args.get(index).map_or(Err(CellError::Value), parse_datetime)
}

fn date_value(date: NaiveDate) -> FormulaValue {
    FormulaValue::String(date.format(DATE_FORMAT).to_string())
}

fn shift_months(date: NaiveDate, months: i64) -> Result<NaiveDate, CellError> {
    let magnitude = u32::try_from(months.unsigned_abs()).map_err(|_| CellError::Num)?;
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(magnitude))
    } else {
        date.checked_sub_months(Months::new(magnitude))
    };
    shifted.ok_or(CellError::Num)
}

/// Build a date the way DATE does: months and days overflow into the next
/// unit, and two-digit style years below 1900 are offset by 1900
fn build_date(year: i64, month: i64, day: i64) -> Result<NaiveDate, CellError> {
    let year = if (0..1900).contains(&year) { year + 1900 } else { year };
    if !(1..=9999).contains(&year)
        || month.unsigned_abs() > 120_000
        || day.unsigned_abs() > MAX_DAY_OFFSET.unsigned_abs()
    {
        return Err(CellError::Num);
    }

    let total_months = year * 12 + (month - 1);
    let first = NaiveDate::from_ymd_opt(
        total_months.div_euclid(12) as i32,
        total_months.rem_euclid(12) as u32 + 1,
        1,
    )
    .ok_or(CellError::Num)?;

    let date = first
        .checked_add_signed(Duration::days(day - 1))
        .ok_or(CellError::Num)?;
    if !(1..=9999).contains(&date.year()) {
        return Err(CellError::Num);
    }
    Ok(date)
}

/// TODAY() - current date
pub fn fn_today(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(date_value(Local::now().date_naive()))
}

/// NOW() - current date and time
pub fn fn_now(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let now = Local::now().naive_local();
    Ok(FormulaValue::String(now.format(DATETIME_FORMAT).to_string()))
}

/// DATE(year, month, day)
pub fn fn_date(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let year = number_arg(args, 0)?.trunc() as i64;
        let month = number_arg(args, 1)?.trunc() as i64;
        let day = number_arg(args, 2)?.trunc() as i64;
        build_date(year, month, day).map(date_value)
    })
}

/// TIME(hour, minute, second) - wraps past midnight
pub fn fn_time(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let hour = number_arg(args, 0)?.trunc();
        let minute = number_arg(args, 1)?.trunc();
        let second = number_arg(args, 2)?.trunc();

        let total = hour * 3600.0 + minute * 60.0 + second;
        if !total.is_finite() || total < 0.0 {
            return Err(CellError::Num);
        }

        let seconds = (total as u64 % 86_400) as u32;
        let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).ok_or(CellError::Num)?;
        Ok(FormulaValue::String(time.format(TIME_FORMAT).to_string()))
    })
}

fn datetime_part(
    args: &[FormulaValue],
    part: impl FnOnce(&NaiveDateTime) -> u32,
) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Number(part(&datetime_arg(args, 0)?) as f64)))
}

/// YEAR(date)
pub fn fn_year(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| Ok(FormulaValue::Number(date_arg(args, 0)?.year() as f64)))
}

/// MONTH(date)
pub fn fn_month(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    datetime_part(args, |dt| dt.month())
}

/// DAY(date)
pub fn fn_day(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    datetime_part(args, |dt| dt.day())
}

/// HOUR(time)
pub fn fn_hour(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    datetime_part(args, |dt| dt.hour())
}

/// MINUTE(time)
pub fn fn_minute(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    datetime_part(args, |dt| dt.minute())
}

/// SECOND(time)
pub fn fn_second(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    datetime_part(args, |dt| dt.second())
}

/// EDATE(start_date, months) - same day of month, clamped to the month's end
pub fn fn_edate(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let start = date_arg(args, 0)?;
        let months = number_arg(args, 1)?.trunc() as i64;
        shift_months(start, months).map(date_value)
    })
}

/// EOMONTH(start_date, months) - last day of the shifted month
pub fn fn_eomonth(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let start = date_arg(args, 0)?;
        let months = number_arg(args, 1)?.trunc() as i64;
        let first = start.with_day(1).ok_or(CellError::Num)?;
        let next_month = shift_months(first, months.checked_add(1).ok_or(CellError::Num)?)?;
        next_month.pred_opt().map(date_value).ok_or(CellError::Num)
    })
}

/// DAYS(end_date, start_date)
pub fn fn_days(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let end = date_arg(args, 0)?;
        let start = date_arg(args, 1)?;
        Ok(FormulaValue::Number((end - start).num_days() as f64))
    })
}

/// DATEDIF(start_date, end_date, unit)
///
/// Units: `"D"` whole days, `"M"` 30-day months, `"Y"` 365-day years.
pub fn fn_datedif(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let start = date_arg(args, 0)?;
        let end = date_arg(args, 1)?;
        let unit = text_arg(args, 2)?.trim().to_uppercase();

        if start > end {
            return Err(CellError::Num);
        }

        let days = (end - start).num_days();
        let result = match unit.as_str() {
            "D" => days,
            "M" => days / 30,
            "Y" => days / 365,
            _ => return Err(CellError::Num),
        };
        Ok(FormulaValue::Number(result as f64))
    })
}

/// WEEKDAY(date, [return_type])
///
/// Type 1: Sunday=1..Saturday=7, type 2: Monday=1..Sunday=7, type 3: Monday=0..Sunday=6.
pub fn fn_weekday(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let weekday = date_arg(args, 0)?.weekday();
        let day = match opt_number_arg(args, 1, 1.0)?.trunc() as i64 {
            1 => weekday.number_from_sunday(),
            2 => weekday.number_from_monday(),
            3 => weekday.num_days_from_monday(),
            _ => return Err(CellError::Num),
        };
        Ok(FormulaValue::Number(day as f64))
    })
}

/// WEEKNUM(date, [return_type]) - week 1 contains January 1st
///
/// Type 1 weeks begin on Sunday, type 2 on Monday.
pub fn fn_weeknum(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let date = date_arg(args, 0)?;
        let week_start = match opt_number_arg(args, 1, 1.0)?.trunc() as i64 {
            1 => Weekday::Sun,
            2 => Weekday::Mon,
            _ => return Err(CellError::Num),
        };

        let jan1 = NaiveDate::from_ymd_opt(date.year(), 1, 1).ok_or(CellError::Num)?;
        let lead = (jan1.weekday().num_days_from_sunday() + 7 - week_start.num_days_from_sunday()) % 7;
        let week = (date.ordinal0() + lead) / 7 + 1;
        Ok(FormulaValue::Number(week as f64))
    })
}

/// NETWORKDAYS(start_date, end_date, [holidays...])
///
/// Counts Monday through Friday inclusive, skipping holidays. The count is
/// negative when the start date is after the end date.
pub fn fn_networkdays(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    guarded(|| {
        let start = date_arg(args, 0)?;
        let end = date_arg(args, 1)?;

        let mut holidays = Vec::new();
        for value in flatten(&args[2..]) {
            if value.is_blank() {
                continue;
            }
            holidays.push(parse_datetime(value)?.date());
        }

        let (from, to, sign) = if start <= end { (start, end, 1.0) } else { (end, start, -1.0) };

        let count = from
            .iter_days()
            .take_while(|day| *day <= to)
            .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
            .filter(|day| !holidays.contains(day))
            .count();

        Ok(FormulaValue::Number(sign * count as f64))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{evaluate_formula, EvaluationContext};
    use pretty_assertions::assert_eq;
    use sheetmaster_core::ComputedValue;

    fn eval(formula: &str) -> ComputedValue {
        evaluate_formula(formula, &EvaluationContext::simple())
    }

    fn text(s: &str) -> ComputedValue {
        ComputedValue::Text(s.to_string())
    }

    fn number(n: f64) -> ComputedValue {
        ComputedValue::Number(n)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_serial_numbers() {
        assert_eq!(datetime_from_serial(1.0).unwrap().date(), ymd(1900, 1, 1));
        assert_eq!(datetime_from_serial(59.0).unwrap().date(), ymd(1900, 2, 28));
        assert_eq!(datetime_from_serial(60.0).unwrap().date(), ymd(1900, 2, 28));
        assert_eq!(datetime_from_serial(61.0).unwrap().date(), ymd(1900, 3, 1));
        assert_eq!(datetime_from_serial(45000.0).unwrap().date(), ymd(2023, 3, 15));

        let noon = datetime_from_serial(45000.5).unwrap();
        assert_eq!(noon.hour(), 12);
        assert!(datetime_from_serial(-1.0).is_err());
    }

    #[test]
    fn test_input_formats() {
        let parse = |s: &str| parse_datetime(&FormulaValue::String(s.to_string()));
        assert_eq!(parse("2024-03-05").unwrap().date(), ymd(2024, 3, 5));
        assert_eq!(parse("2024/03/05").unwrap().date(), ymd(2024, 3, 5));
        assert_eq!(parse("03/05/2024").unwrap().date(), ymd(2024, 3, 5));
        assert_eq!(parse("2024-03-05T10:20:30Z").unwrap().minute(), 20);
        assert_eq!(parse("2024-03-05 10:20:30").unwrap().second(), 30);
        assert_eq!(parse("14:45").unwrap().hour(), 14);
        assert_eq!(parse("not a date"), Err(CellError::Value));
        assert_eq!(parse_datetime(&FormulaValue::Boolean(true)), Err(CellError::Value));
    }

    #[test]
    fn test_date_and_time_construction() {
        assert_eq!(eval("=DATE(2024,2,29)"), text("2024-02-29"));
        assert_eq!(eval("=DATE(2024,13,1)"), text("2025-01-01"));
        assert_eq!(eval("=DATE(2024,3,0)"), text("2024-02-29"));
        assert_eq!(eval("=DATE(99,1,1)"), text("1999-01-01"));
        assert_eq!(eval("=DATE(10000,1,1)"), ComputedValue::Error(CellError::Num));
        assert_eq!(eval("=TIME(9,5,7)"), text("09:05:07"));
        assert_eq!(eval("=TIME(25,0,0)"), text("01:00:00"));
        assert_eq!(eval("=TIME(-1,0,0)"), ComputedValue::Error(CellError::Num));
    }

    #[test]
    fn test_parts() {
        assert_eq!(eval("=YEAR(\"2024-03-05\")"), number(2024.0));
        assert_eq!(eval("=MONTH(\"2024-03-05\")"), number(3.0));
        assert_eq!(eval("=DAY(DATE(2024,3,5))"), number(5.0));
        assert_eq!(eval("=HOUR(\"2024-03-05 17:04:09\")"), number(17.0));
        assert_eq!(eval("=MINUTE(\"17:04:09\")"), number(4.0));
        assert_eq!(eval("=SECOND(TIME(1,2,3))"), number(3.0));
        assert_eq!(eval("=HOUR(0.25)"), number(6.0));
        assert_eq!(eval("=YEAR(\"soon\")"), ComputedValue::Error(CellError::Value));
    }

    #[test]
    fn test_month_arithmetic() {
        assert_eq!(eval("=EDATE(\"2024-01-31\",1)"), text("2024-02-29"));
        assert_eq!(eval("=EDATE(\"2024-03-15\",-3)"), text("2023-12-15"));
        assert_eq!(eval("=EOMONTH(\"2024-01-15\",0)"), text("2024-01-31"));
        assert_eq!(eval("=EOMONTH(\"2024-01-15\",1)"), text("2024-02-29"));
        assert_eq!(eval("=EOMONTH(\"2024-01-15\",-2)"), text("2023-11-30"));

        for formula in [
            "=EOMONTH(\"2024-01-15\",1e30)",
            "=EOMONTH(\"2024-01-15\",-1e30)",
            "=EDATE(\"2024-01-15\",1e30)",
            "=DATE(2024,-1e30,1)",
            "=DATE(2024,1,-1e30)",
        ] {
            assert_eq!(eval(formula), ComputedValue::Error(CellError::Num), "{}", formula);
        }
    }

    #[test]
    fn test_differences() {
        assert_eq!(eval("=DAYS(\"2024-03-01\",\"2024-02-01\")"), number(29.0));
        assert_eq!(eval("=DAYS(\"2024-02-01\",\"2024-03-01\")"), number(-29.0));
        assert_eq!(eval("=DATEDIF(\"2020-01-01\",\"2024-01-01\",\"Y\")"), number(4.0));
        assert_eq!(eval("=DATEDIF(\"2024-01-01\",\"2024-03-01\",\"m\")"), number(2.0));
        assert_eq!(eval("=DATEDIF(\"2024-01-01\",\"2024-01-11\",\"D\")"), number(10.0));
        assert_eq!(eval("=DATEDIF(\"2024-02-01\",\"2024-01-01\",\"D\")"), ComputedValue::Error(CellError::Num));
        assert_eq!(eval("=DATEDIF(\"2024-01-01\",\"2024-02-01\",\"Q\")"), ComputedValue::Error(CellError::Num));
    }

    #[test]
    fn test_weekdays() {
        // 2024-03-03 is a Sunday
        assert_eq!(eval("=WEEKDAY(\"2024-03-03\")"), number(1.0));
        assert_eq!(eval("=WEEKDAY(\"2024-03-03\",2)"), number(7.0));
        assert_eq!(eval("=WEEKDAY(\"2024-03-04\",3)"), number(0.0));
        assert_eq!(eval("=WEEKDAY(\"2024-03-04\",9)"), ComputedValue::Error(CellError::Num));

        // 2024-01-01 is a Monday
        assert_eq!(eval("=WEEKNUM(\"2024-01-06\")"), number(1.0));
        assert_eq!(eval("=WEEKNUM(\"2024-01-07\")"), number(2.0));
        assert_eq!(eval("=WEEKNUM(\"2024-01-07\",2)"), number(1.0));
        assert_eq!(eval("=WEEKNUM(\"2024-01-08\",2)"), number(2.0));
    }

    #[test]
    fn test_networkdays() {
        assert_eq!(eval("=NETWORKDAYS(\"2024-03-01\",\"2024-03-08\")"), number(6.0));
        assert_eq!(eval("=NETWORKDAYS(\"2024-03-08\",\"2024-03-01\")"), number(-6.0));
        assert_eq!(
            eval("=NETWORKDAYS(\"2024-03-01\",\"2024-03-08\",\"2024-03-04\",\"2024-03-09\")"),
            number(5.0)
        );
        assert_eq!(eval("=NETWORKDAYS(\"x\",\"2024-03-08\")"), ComputedValue::Error(CellError::Value));
    }

    #[test]
    fn test_today_and_now_shapes() {
        let ComputedValue::Text(today) = eval("=TODAY()") else {
            panic!("TODAY should produce text");
        };
        assert!(NaiveDate::parse_from_str(&today, DATE_FORMAT).is_ok());

        let ComputedValue::Text(now) = eval("=NOW()") else {
            panic!("NOW should produce text");
        };
        assert!(NaiveDateTime::parse_from_str(&now, DATETIME_FORMAT).is_ok());
    }
}
