use crate::criteria::Criterion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_RETRY_BUDGET: u32 = 3;

fn default_retry_budget() -> u32 {
    DEFAULT_RETRY_BUDGET
}

/// Run-unique identity of a step on the plan stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// One unit of actuation plus its declared success criteria.
///
/// Steps are never edited once planned; a failed step is replaced by a
/// recovery segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Keyed by field path. Criteria are evaluated and reported in path
    /// order, not in the order they were written.
    #[serde(default)]
    pub success_criteria: BTreeMap<String, Criterion>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Step {
    pub fn new(actor: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            parameters: Map::new(),
            success_criteria: BTreeMap::new(),
            continue_on_error: false,
            retry_budget: DEFAULT_RETRY_BUDGET,
            description: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_criterion(mut self, path: impl Into<String>, criterion: Criterion) -> Self {
        self.success_criteria.insert(path.into(), criterion);
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.actor, self.action)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: String,
    pub title: String,
    pub application: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<i64>,
    #[serde(default)]
    pub focused: bool,
}

/// Point-in-time description of the desktop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub active_application: Option<String>,
    #[serde(default)]
    pub window_list: Vec<WindowInfo>,
    #[serde(default)]
    pub element_tree: Option<Value>,
    #[serde(default)]
    pub extra_fields: Map<String, Value>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            active_application: None,
            window_list: Vec::new(),
            element_tree: None,
            extra_fields: Map::new(),
        }
    }

    /// Placeholder handed to the planner when no capture succeeded yet.
    pub fn unavailable() -> Self {
        let mut snapshot = Self::new(Utc::now());
        snapshot
            .extra_fields
            .insert("unavailable".to_string(), Value::Bool(true));
        snapshot
    }

    pub fn with_active_application(mut self, application: impl Into<String>) -> Self {
        self.active_application = Some(application.into());
        self
    }

    pub fn with_window(mut self, window: WindowInfo) -> Self {
        self.window_list.push(window);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra_fields.insert(name.into(), value);
        self
    }

    /// JSON view used for field-path lookups.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmetCriterion {
    pub criterion: String,
    pub expected: Value,
    pub actual: Option<Value>,
}

impl UnmetCriterion {
    /// Pseudo-criterion describing an invocation failure, so the planner sees
    /// why the step did not complete.
    pub fn actuation(error: &str) -> Self {
        Self {
            criterion: "$actuation".to_string(),
            expected: json!("actor invocation succeeds"),
            actual: Some(json!(error)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub unmet_criteria: Vec<UnmetCriterion>,
}

impl ValidationResult {
    pub fn from_unmet(unmet_criteria: Vec<UnmetCriterion>) -> Self {
        Self {
            passed: unmet_criteria.is_empty(),
            unmet_criteria,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    /// Criteria met on re-check after a recovery segment.
    Recovered,
    ActorMissing,
    ActuationError,
    ValidationFailure,
    /// Planner returned an empty recovery plan.
    NoCorrection,
    SkippedAfterExhaustion,
    RetryBudgetExhausted,
    PlanningUnavailable,
}

impl StepOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, StepOutcome::Success | StepOutcome::Recovered)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepOutcome::Success => "Success",
            StepOutcome::Recovered => "Recovered",
            StepOutcome::ActorMissing => "ActorMissing",
            StepOutcome::ActuationError => "ActuationError",
            StepOutcome::ValidationFailure => "ValidationFailure",
            StepOutcome::NoCorrection => "NoCorrection",
            StepOutcome::SkippedAfterExhaustion => "SkippedAfterExhaustion",
            StepOutcome::RetryBudgetExhausted => "RetryBudgetExhausted",
            StepOutcome::PlanningUnavailable => "PlanningUnavailable",
        };
        f.write_str(name)
    }
}

/// Append-only audit entry, one per step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub sequence: usize,
    pub step_id: StepId,
    pub step: Step,
    /// Plan stack depth the step ran at; 1 is the top-level plan.
    pub depth: usize,
    pub attempt_number: u32,
    pub validation_result: Option<ValidationResult>,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}
