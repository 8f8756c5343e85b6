//! Evaluates step success criteria against a before/after snapshot pair.
//!
//! Validation is synchronous and pure: the same inputs always produce the same
//! [`ValidationResult`], with unmet criteria listed in field-path order.

use crate::criteria::Criterion;
use crate::types::{Snapshot, UnmetCriterion, ValidationResult};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Splits `window_list[0].title` into `window_list`, `0`, `title`.
/// Purely numeric dotted segments (`window_list.0`) also index arrays.
fn segments(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            out.push(Segment::Key(key));
        }
        while let Some(stripped) = rest.strip_prefix('[') {
            let end = stripped.find(']')?;
            let index = stripped[..end].trim().parse().ok()?;
            out.push(Segment::Index(index));
            rest = &stripped[end + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
        if key.is_empty() && part.is_empty() {
            return None;
        }
    }
    Some(out)
}

/// Resolves a field path; `None` when absent. Null counts as absent.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments(path)? {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
            (Segment::Index(index), Value::Array(items)) => items.get(index)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Numbers compare as themselves; arrays, strings and objects by length.
fn magnitude(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Array(items) => Some(items.len() as f64),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Object(map) => Some(map.len() as f64),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(s), Value::String(n)) => s.contains(n.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateValidator;

impl StateValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        criteria: &BTreeMap<String, Criterion>,
        before: &Snapshot,
        after: &Snapshot,
    ) -> ValidationResult {
        check(criteria, Some(&before.to_value()), &after.to_value())
    }

    /// Validates when no pre-step snapshot was captured. Criteria that compare
    /// against the previous state (`unchanged`, `changed`) are unmet.
    pub fn validate_without_baseline(
        &self,
        criteria: &BTreeMap<String, Criterion>,
        after: &Snapshot,
    ) -> ValidationResult {
        check(criteria, None, &after.to_value())
    }
}

fn check(
    criteria: &BTreeMap<String, Criterion>,
    before: Option<&Value>,
    after: &Value,
) -> ValidationResult {
    let unmet = criteria
        .iter()
        .filter_map(|(path, criterion)| {
            let actual = lookup(after, path);
            let passed = match before {
                Some(before) => evaluate(criterion, actual, lookup(before, path)),
                None => !criterion.compares_before() && evaluate(criterion, actual, None),
            };
            if passed {
                None
            } else {
                Some(UnmetCriterion {
                    criterion: path.clone(),
                    expected: criterion.clone().into(),
                    actual: actual.cloned(),
                })
            }
        })
        .collect();

    ValidationResult::from_unmet(unmet)
}

/// Absent targets fail closed, except `exists: false`.
fn evaluate(criterion: &Criterion, actual: Option<&Value>, previous: Option<&Value>) -> bool {
    if let Criterion::Exists(expected) = criterion {
        return actual.is_some() == *expected;
    }

    let Some(actual) = actual else {
        return false;
    };

    match criterion {
        Criterion::Equals(expected) => values_equal(actual, expected),
        Criterion::NotEquals(expected) => !values_equal(actual, expected),
        Criterion::OneOf(options) => options.iter().any(|o| values_equal(actual, o)),
        Criterion::Contains(needle) => contains(actual, needle),
        Criterion::GreaterThan(n) => magnitude(actual).is_some_and(|v| v > *n),
        Criterion::AtLeast(n) => magnitude(actual).is_some_and(|v| v >= *n),
        Criterion::LessThan(n) => magnitude(actual).is_some_and(|v| v < *n),
        Criterion::AtMost(n) => magnitude(actual).is_some_and(|v| v <= *n),
        Criterion::Matches(pattern) => match Regex::new(pattern) {
            Ok(re) => re.is_match(&text(actual)),
            Err(e) => {
                tracing::warn!("Criterion pattern '{}' failed to compile: {}", pattern, e);
                false
            }
        },
        Criterion::Unchanged => previous.is_some_and(|p| values_equal(actual, p)),
        Criterion::Changed => previous.map_or(true, |p| !values_equal(actual, p)),
        Criterion::Exists(_) => true,
    }
}
