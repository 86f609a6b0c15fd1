//! Computed cell values and error sentinels

use std::fmt;

/// Error sentinels a cell can display
///
/// Errors are per-cell values, never panics or aborts: a cell holding one of
/// these stays addressable and feeds downstream formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellError {
    /// #DIV/0! - Division by zero
    Div0,
    /// #VALUE! - Wrong type of argument or operand
    Value,
    /// #REF! - Invalid or out-of-bounds reference
    Ref,
    /// #NUM! - Invalid numeric value
    Num,
    /// #N/A - Value not available
    Na,
    /// #CIRCULAR! - Cell is part of a reference cycle
    Circular,
    /// #ERROR - Anything else that could not be parsed or evaluated
    Generic,
}

impl CellError {
    /// Get the display string for this error
    pub fn as_str(&self) -> &'static str {
        match self {
            CellError::Div0 => "#DIV/0!",
            CellError::Value => "#VALUE!",
            CellError::Ref => "#REF!",
            CellError::Num => "#NUM!",
            CellError::Na => "#N/A",
            CellError::Circular => "#CIRCULAR!",
            CellError::Generic => "#ERROR",
        }
    }

    /// Parse an error string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "#DIV/0!" => Some(CellError::Div0),
            "#VALUE!" => Some(CellError::Value),
            "#REF!" => Some(CellError::Ref),
            "#NUM!" => Some(CellError::Num),
            "#N/A" => Some(CellError::Na),
            "#CIRCULAR!" => Some(CellError::Circular),
            "#ERROR" => Some(CellError::Generic),
            _ => None,
        }
    }

    /// Stable ordering code, used when comparing two errors
    pub fn code(&self) -> u8 {
        match self {
            CellError::Div0 => 1,
            CellError::Value => 2,
            CellError::Ref => 3,
            CellError::Num => 4,
            CellError::Na => 5,
            CellError::Circular => 6,
            CellError::Generic => 7,
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The derived value of a cell
///
/// Literal cells compute to a number when their raw text parses as one and to
/// text otherwise. Formula cells compute to whatever the formula produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputedValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl Default for ComputedValue {
    fn default() -> Self {
        ComputedValue::Text(String::new())
    }
}

impl ComputedValue {
    /// Coerce a literal raw input the way the sheet displays it
    ///
    /// ```
    /// use sheetmaster_core::ComputedValue;
    ///
    /// assert_eq!(ComputedValue::from_literal(" 42 "), ComputedValue::Number(42.0));
    /// assert_eq!(ComputedValue::from_literal("apples"), ComputedValue::Text("apples".into()));
    /// ```
    pub fn from_literal(raw: &str) -> Self {
        match parse_number(raw) {
            Some(n) => ComputedValue::Number(n),
            None => ComputedValue::Text(raw.to_string()),
        }
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ComputedValue::Number(n) => Some(*n),
            ComputedValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            ComputedValue::Text(s) => parse_number(s),
            ComputedValue::Error(_) => None,
        }
    }

    /// Check if the value is an error sentinel
    pub fn is_error(&self) -> bool {
        matches!(self, ComputedValue::Error(_))
    }

    /// Get the error if this is one
    pub fn error(&self) -> Option<CellError> {
        match self {
            ComputedValue::Error(e) => Some(*e),
            _ => None,
        }
    }
}

impl fmt::Display for ComputedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputedValue::Number(n) => write!(f, "{}", format_number(*n)),
            ComputedValue::Text(s) => write!(f, "{}", s),
            ComputedValue::Boolean(true) => write!(f, "TRUE"),
            ComputedValue::Boolean(false) => write!(f, "FALSE"),
            ComputedValue::Error(e) => write!(f, "{}", e),
        }
    }
}

impl From<CellError> for ComputedValue {
    fn from(e: CellError) -> Self {
        ComputedValue::Error(e)
    }
}

/// Parse text as a finite number, ignoring surrounding whitespace
///
/// `inf`, `NaN` and friends are rejected so that a computed number is always finite.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Format a number without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Values serialize as plain JSON scalars, errors as their sentinel text.
/// Text that reads as a sentinel is written as `{"text": "#N/A"}` so it
/// does not come back as an error.
#[cfg(feature = "serde")]
mod serde_impl {
    use super::{CellError, ComputedValue};
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    const TEXT_KEY: &str = "text";

    impl Serialize for ComputedValue {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                ComputedValue::Number(n) => serializer.serialize_f64(*n),
                ComputedValue::Text(s) if CellError::from_str(s).is_some() => {
                    let mut map = serializer.serialize_map(Some(1))?;
                    map.serialize_entry(TEXT_KEY, s)?;
                    map.end()
                }
                ComputedValue::Text(s) => serializer.serialize_str(s),
                ComputedValue::Boolean(b) => serializer.serialize_bool(*b),
                ComputedValue::Error(e) => serializer.serialize_str(e.as_str()),
            }
        }
    }

    struct ComputedVisitor;

    impl<'de> Visitor<'de> for ComputedVisitor {
        type Value = ComputedValue;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, string, boolean or error sentinel")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<ComputedValue, E> {
            Ok(ComputedValue::Boolean(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<ComputedValue, E> {
            Ok(ComputedValue::Number(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<ComputedValue, E> {
            Ok(ComputedValue::Number(v as f64))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<ComputedValue, E> {
            Ok(ComputedValue::Number(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<ComputedValue, E> {
            Ok(match CellError::from_str(v) {
                Some(e) => ComputedValue::Error(e),
                None => ComputedValue::Text(v.to_string()),
            })
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ComputedValue, A::Error> {
            let mut text = None;
            while let Some(key) = map.next_key::<String>()? {
                if key != TEXT_KEY {
                    return Err(de::Error::unknown_field(&key, &[TEXT_KEY]));
                }
                text = Some(map.next_value::<String>()?);
            }
            text.map(ComputedValue::Text)
                .ok_or_else(|| de::Error::missing_field(TEXT_KEY))
        }
    }

    impl<'de> Deserialize<'de> for ComputedValue {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(ComputedVisitor)
        }
    }
}
