//! Success criteria attached to a step.
//!
//! On the wire a criterion is either a literal (equality) or an object with
//! exactly one operator key, e.g. `{"gte": 2}` or `{"matches": "(?i)firefox"}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid criterion: {0}")]
pub struct CriterionError(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Criterion {
    Equals(Value),
    NotEquals(Value),
    /// Actual value must be one of the listed values.
    OneOf(Vec<Value>),
    /// Substring, array element, or object key.
    Contains(Value),
    GreaterThan(f64),
    AtLeast(f64),
    LessThan(f64),
    AtMost(f64),
    Matches(String),
    Exists(bool),
    /// Value after the step equals the value before it.
    Unchanged,
    /// Value after the step differs from the value before it.
    Changed,
}

const OPERATORS: [&str; 12] = [
    "equals",
    "not_equals",
    "in",
    "contains",
    "gt",
    "gte",
    "lt",
    "lte",
    "matches",
    "exists",
    "unchanged",
    "changed",
];

fn number(op: &str, operand: &Value) -> Result<f64, CriterionError> {
    operand
        .as_f64()
        .ok_or_else(|| CriterionError(format!("'{}' expects a number, got {}", op, operand)))
}

fn flag(op: &str, operand: &Value) -> Result<bool, CriterionError> {
    operand
        .as_bool()
        .ok_or_else(|| CriterionError(format!("'{}' expects a boolean, got {}", op, operand)))
}

impl TryFrom<Value> for Criterion {
    type Error = CriterionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let operator = match &value {
            Value::Object(map) if map.len() == 1 => map
                .iter()
                .next()
                .filter(|(key, _)| OPERATORS.contains(&key.as_str()))
                .map(|(key, operand)| (key.clone(), operand.clone())),
            _ => None,
        };

        let Some((op, operand)) = operator else {
            return Ok(Criterion::Equals(value));
        };

        let criterion = match op.as_str() {
            "equals" => Criterion::Equals(operand),
            "not_equals" => Criterion::NotEquals(operand),
            "in" => match operand {
                Value::Array(items) => Criterion::OneOf(items),
                other => {
                    return Err(CriterionError(format!("'in' expects an array, got {}", other)))
                }
            },
            "contains" => Criterion::Contains(operand),
            "gt" => Criterion::GreaterThan(number(&op, &operand)?),
            "gte" => Criterion::AtLeast(number(&op, &operand)?),
            "lt" => Criterion::LessThan(number(&op, &operand)?),
            "lte" => Criterion::AtMost(number(&op, &operand)?),
            "matches" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    CriterionError(format!("'matches' expects a string, got {}", operand))
                })?;
                regex::Regex::new(pattern)
                    .map_err(|e| CriterionError(format!("bad pattern '{}': {}", pattern, e)))?;
                Criterion::Matches(pattern.to_string())
            }
            "exists" => Criterion::Exists(flag(&op, &operand)?),
            "unchanged" => {
                if flag(&op, &operand)? {
                    Criterion::Unchanged
                } else {
                    Criterion::Changed
                }
            }
            "changed" => {
                if flag(&op, &operand)? {
                    Criterion::Changed
                } else {
                    Criterion::Unchanged
                }
            }
            _ => Criterion::Equals(value),
        };

        Ok(criterion)
    }
}

impl From<Criterion> for Value {
    fn from(criterion: Criterion) -> Self {
        match criterion {
            Criterion::Equals(Value::Object(map)) => json!({ "equals": map }),
            Criterion::Equals(value) => value,
            Criterion::NotEquals(value) => json!({ "not_equals": value }),
            Criterion::OneOf(items) => json!({ "in": items }),
            Criterion::Contains(value) => json!({ "contains": value }),
            Criterion::GreaterThan(n) => json!({ "gt": n }),
            Criterion::AtLeast(n) => json!({ "gte": n }),
            Criterion::LessThan(n) => json!({ "lt": n }),
            Criterion::AtMost(n) => json!({ "lte": n }),
            Criterion::Matches(pattern) => json!({ "matches": pattern }),
            Criterion::Exists(flag) => json!({ "exists": flag }),
            Criterion::Unchanged => json!({ "unchanged": true }),
            Criterion::Changed => json!({ "changed": true }),
        }
    }
}

impl Criterion {
    /// Whether the criterion is judged against the pre-step snapshot too.
    pub fn compares_before(&self) -> bool {
        matches!(self, Criterion::Unchanged | Criterion::Changed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_equality() {
        assert_eq!(
            Criterion::try_from(json!("firefox")).unwrap(),
            Criterion::Equals(json!("firefox"))
        );
        assert_eq!(
            Criterion::try_from(json!({"title": "x", "app": "y"})).unwrap(),
            Criterion::Equals(json!({"title": "x", "app": "y"}))
        );
    }

    #[test]
    fn test_operator_forms() {
        assert_eq!(
            Criterion::try_from(json!({"gte": 2})).unwrap(),
            Criterion::AtLeast(2.0)
        );
        assert_eq!(
            Criterion::try_from(json!({"in": ["a", "b"]})).unwrap(),
            Criterion::OneOf(vec![json!("a"), json!("b")])
        );
        assert_eq!(
            Criterion::try_from(json!({"unchanged": false})).unwrap(),
            Criterion::Changed
        );
    }

    #[test]
    fn test_unknown_single_key_object_is_literal() {
        assert_eq!(
            Criterion::try_from(json!({"title": "Inbox"})).unwrap(),
            Criterion::Equals(json!({"title": "Inbox"}))
        );
    }

    #[test]
    fn test_bad_operands_rejected() {
        assert!(Criterion::try_from(json!({"gt": "ten"})).is_err());
        assert!(Criterion::try_from(json!({"in": "abc"})).is_err());
        assert!(Criterion::try_from(json!({"matches": "(unclosed"})).is_err());
        assert!(Criterion::try_from(json!({"exists": 1})).is_err());
    }

    #[test]
    fn test_object_equality_survives_serialization() {
        let criterion = Criterion::Equals(json!({"gt": 1}));
        let value: Value = criterion.clone().into();
        assert_eq!(value, json!({"equals": {"gt": 1}}));
        assert_eq!(Criterion::try_from(value).unwrap(), criterion);
    }
}
