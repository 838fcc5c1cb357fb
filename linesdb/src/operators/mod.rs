// Predicate operators for where-style queries

use crate::error::{LinesDbError, Result};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// The fixed set of comparison primitives accepted by predicate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    Match,
}

impl Operator {
    /// Parse an operator token, case-insensitively. Any other token is an
    /// operator error.
    pub fn parse(token: &str) -> Result<Self> {
        match token.to_lowercase().as_str() {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            "in" => Ok(Self::In),
            "match" => Ok(Self::Match),
            other => Err(LinesDbError::Operator(format!("Unknown operator '{other}'"))),
        }
    }
}

/// Evaluate `operator` against two operands.
///
/// Comparisons are well-typed: numbers compare numerically (i64/f64
/// unified), strings lexicographically, and a cross-type pairing is never
/// equal and never ordered. `in` requires an array on the right and tests
/// membership; `match` requires strings on both sides and treats the right
/// operand as a regular expression tested anywhere in the left.
pub fn evaluate(operator: &str, left: &Value, right: &Value) -> Result<bool> {
    match Operator::parse(operator)? {
        Operator::Eq => Ok(values_equal(left, right)),
        Operator::Ne => Ok(!values_equal(left, right)),
        Operator::Gt => Ok(compare(left, right) == Some(Ordering::Greater)),
        Operator::Lt => Ok(compare(left, right) == Some(Ordering::Less)),
        Operator::Ge => Ok(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        Operator::Le => Ok(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        Operator::In => {
            let items = right.as_array().ok_or_else(|| {
                LinesDbError::Operator("Type mismatch for IN operator: expected an array".into())
            })?;
            Ok(items.iter().any(|item| values_equal(left, item)))
        }
        Operator::Match => {
            let subject = left.as_str().ok_or_else(|| match_operand_error(left))?;
            let pattern = right.as_str().ok_or_else(|| match_operand_error(right))?;
            let re = Regex::new(pattern).map_err(|e| {
                LinesDbError::Operator(format!("Invalid pattern for MATCH operator: {e}"))
            })?;
            Ok(re.is_match(subject))
        }
    }
}

fn match_operand_error(operand: &Value) -> LinesDbError {
    LinesDbError::Operator(format!(
        "Type mismatch for MATCH operator: expected a string, got {operand}"
    ))
}

/// Typed equality: numeric across integer/float representations, structural
/// everywhere else. No coercion across types.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Typed ordering: numbers against numbers, strings against strings.
/// Anything else is unordered.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
