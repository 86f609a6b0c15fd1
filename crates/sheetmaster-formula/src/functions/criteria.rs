//! Criteria matching for SUMIF, COUNTIF, AVERAGEIF and their multi-criteria forms
//!
//! A criterion can be:
//! - A number or boolean: equality (e.g., 5)
//! - A text string: exact, case-sensitive equality (e.g., "apple")
//! - A comparison expression: ">5", ">=10", "<100", "<=50", "<>0", "!=0", "=5"
//!
//! Numeric comparison applies only when both the candidate and the operand are
//! numbers; otherwise the comparison is made on text. An empty criterion matches
//! nothing, while `"="` alone matches blank cells and `"<>"` non-blank ones.

use super::cells_of;
use crate::evaluator::FormulaValue;
use sheetmaster_core::{parse_number, CellError};
use std::cmp::Ordering;

/// Criteria matcher for the conditional aggregates
#[derive(Debug)]
pub struct CriteriaMatcher {
    criteria_type: CriteriaType,
}

#[derive(Debug)]
enum CriteriaType {
    /// Compare candidates against an operand
    Compare(ComparisonOp, Operand),
    /// Matches nothing (empty or error criteria)
    Never,
}

#[derive(Debug)]
struct Operand {
    text: String,
    number: Option<f64>,
}

impl Operand {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            number: parse_number(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl ComparisonOp {
    fn test(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering.is_eq(),
            ComparisonOp::NotEqual => ordering.is_ne(),
            ComparisonOp::LessThan => ordering.is_lt(),
            ComparisonOp::LessEqual => ordering.is_le(),
            ComparisonOp::GreaterThan => ordering.is_gt(),
            ComparisonOp::GreaterEqual => ordering.is_ge(),
        }
    }
}

impl CriteriaMatcher {
    /// Create a new criteria matcher from a FormulaValue
    pub fn new(criteria: &FormulaValue) -> Self {
        let criteria_type = match criteria {
            FormulaValue::Number(_) | FormulaValue::Boolean(_) => {
                CriteriaType::Compare(ComparisonOp::Equal, Operand::new(&criteria.as_string()))
            }
            FormulaValue::String(s) => Self::parse_string_criteria(s),
            FormulaValue::Empty | FormulaValue::Error(_) | FormulaValue::Array(_) => CriteriaType::Never,
        };

        Self { criteria_type }
    }

    fn parse_string_criteria(s: &str) -> CriteriaType {
        let s = s.trim();

        if s.is_empty() {
            return CriteriaType::Never;
        }

        // Longer operators first
        let operators = [
            (">=", ComparisonOp::GreaterEqual),
            ("<=", ComparisonOp::LessEqual),
            ("<>", ComparisonOp::NotEqual),
            ("!=", ComparisonOp::NotEqual),
            (">", ComparisonOp::GreaterThan),
            ("<", ComparisonOp::LessThan),
            ("=", ComparisonOp::Equal),
        ];

        for (prefix, op) in operators {
            if let Some(rest) = s.strip_prefix(prefix) {
                return CriteriaType::Compare(op, Operand::new(rest.trim()));
            }
        }

        CriteriaType::Compare(ComparisonOp::Equal, Operand::new(s))
    }

    /// Check if a value matches the criteria
    pub fn matches(&self, value: &FormulaValue) -> bool {
        let (op, operand) = match &self.criteria_type {
            CriteriaType::Compare(op, operand) => (*op, operand),
            CriteriaType::Never => return false,
        };

        let candidate_number = match value {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::String(s) => parse_number(s),
            FormulaValue::Error(_) | FormulaValue::Array(_) => return false,
            FormulaValue::Boolean(_) | FormulaValue::Empty => None,
        };

        if let (Some(candidate), Some(number)) = (candidate_number, operand.number) {
            return candidate
                .partial_cmp(&number)
                .map_or(false, |ordering| op.test(ordering));
        }

        let candidate = value.as_string();

        // Blank cells only take part in equality tests
        if candidate.is_empty() && !matches!(op, ComparisonOp::Equal | ComparisonOp::NotEqual) {
            return false;
        }

        op.test(candidate.as_str().cmp(operand.text.as_str()))
    }
}

/// Criteria ranges paired with their matchers, for the `*IFS` functions
pub(crate) struct CriteriaSet<'a> {
    pairs: Vec<(Vec<&'a FormulaValue>, CriteriaMatcher)>,
}

impl<'a> CriteriaSet<'a> {
    /// Build from `range1, criteria1, range2, criteria2, ...`
    ///
    /// An odd or empty argument list is malformed and yields `#ERROR`.
    pub(crate) fn from_pairs(args: &'a [FormulaValue]) -> Result<Self, CellError> {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err(CellError::Generic);
        }

        let mut pairs = Vec::with_capacity(args.len() / 2);
        for pair in args.chunks(2) {
            if let FormulaValue::Error(e) = &pair[1] {
                return Err(*e);
            }
            pairs.push((cells_of(&pair[0]), CriteriaMatcher::new(&pair[1])));
        }

        Ok(Self { pairs })
    }

    /// Length of the shortest criteria range
    pub(crate) fn len(&self) -> usize {
        self.pairs.iter().map(|(cells, _)| cells.len()).min().unwrap_or(0)
    }

    /// True when every criterion matches its range at `index`
    pub(crate) fn matches(&self, index: usize) -> bool {
        self.pairs
            .iter()
            .all(|(cells, matcher)| cells.get(index).map_or(false, |v| matcher.matches(v)))
    }
}
