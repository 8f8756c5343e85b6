//! Plans and their boundary parsing.
//!
//! Planner output is loosely shaped JSON. Everything entering the engine goes
//! through [`parse_plan`] (or [`Plan::validate`] for plans built in code), so
//! the engine only ever walks structurally sound steps.

use crate::criteria::Criterion;
use crate::types::{Step, DEFAULT_RETRY_BUDGET};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("Not a plan: {0}")]
    NotAPlan(String),
    #[error("Invalid step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
}

/// Values applied to steps that leave optional fields out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanDefaults {
    pub retry_budget: u32,
    pub continue_on_error: bool,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            continue_on_error: false,
        }
    }
}

/// Ordered steps; insertion order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Applies `defaults` to every step. For plans whose steps carry no
    /// budget or error policy of their own, such as template output.
    pub fn with_defaults(mut self, defaults: &PlanDefaults) -> Self {
        for step in &mut self.steps {
            step.retry_budget = defaults.retry_budget;
            step.continue_on_error = defaults.continue_on_error;
        }
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.actor.trim().is_empty() {
                return Err(invalid(index, "actor is empty"));
            }
            if step.action.trim().is_empty() {
                return Err(invalid(index, "action is empty"));
            }
        }
        Ok(())
    }
}

fn invalid(index: usize, reason: impl Into<String>) -> PlanError {
    PlanError::InvalidStep {
        index,
        reason: reason.into(),
    }
}

fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| object.get(*name))
        .filter(|v| !v.is_null())
}

fn parse_identifier(
    index: usize,
    object: &Map<String, Value>,
    name: &str,
) -> Result<String, PlanError> {
    match field(object, &[name]) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(invalid(index, format!("'{}' is empty", name))),
        Some(other) => Err(invalid(
            index,
            format!("'{}' must be a string, got {}", name, other),
        )),
        None => Err(invalid(index, format!("missing '{}'", name))),
    }
}

fn parse_step(index: usize, raw: &Value, defaults: &PlanDefaults) -> Result<Step, PlanError> {
    let object = raw
        .as_object()
        .ok_or_else(|| invalid(index, "step must be an object"))?;

    let actor = parse_identifier(index, object, "actor")?;
    let action = parse_identifier(index, object, "action")?;

    let parameters = match field(object, &["parameters", "params"]) {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(invalid(index, "'parameters' must be an object")),
    };

    let success_criteria = match field(object, &["success_criteria", "expected_outcome"]) {
        None => BTreeMap::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(path, expected)| {
                Criterion::try_from(expected.clone())
                    .map(|c| (path.clone(), c))
                    .map_err(|e| invalid(index, format!("criterion '{}': {}", path, e.0)))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(invalid(index, "'success_criteria' must be an object")),
    };

    let continue_on_error = match field(object, &["continue_on_error"]) {
        None => defaults.continue_on_error,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(invalid(index, "'continue_on_error' must be a boolean")),
    };

    let retry_budget = match field(object, &["retry_budget", "max_retries"]) {
        None => defaults.retry_budget,
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| invalid(index, "'retry_budget' must be a non-negative integer"))?,
    };

    let description = field(object, &["description"])
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Step {
        actor,
        action,
        parameters,
        success_criteria,
        continue_on_error,
        retry_budget,
        description,
    })
}

/// Parses planner output into a [`Plan`].
///
/// Accepts `{"steps": [...]}` or a bare array of steps.
pub fn parse_plan(raw: &Value, defaults: &PlanDefaults) -> Result<Plan, PlanError> {
    let steps = match raw {
        Value::Array(steps) => steps,
        Value::Object(object) => match object.get("steps") {
            Some(Value::Array(steps)) => steps,
            Some(_) => return Err(PlanError::NotAPlan("'steps' must be an array".to_string())),
            None => return Err(PlanError::NotAPlan("missing 'steps'".to_string())),
        },
        other => {
            return Err(PlanError::NotAPlan(format!(
                "expected object or array, got {}",
                type_name(other)
            )))
        }
    };

    let steps = steps
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_step(index, raw, defaults))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Plan { steps })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
