//! Engine configuration, passed by value into the engine constructor.

use crate::planning::PlanDefaults;
use crate::types::DEFAULT_RETRY_BUDGET;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid engine config: {0}")]
    Invalid(String),
}

/// What a finished recovery segment proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Re-validate the failed step's criteria against a fresh snapshot.
    #[default]
    Recheck,
    /// The segment's own step validations are sufficient.
    TrustSegment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Applied to planned steps that do not declare a budget.
    pub default_retry_budget: u32,
    pub action_timeout_ms: u64,
    pub snapshot_timeout_ms: u64,
    pub oracle_timeout_ms: u64,
    /// Maximum plan stack depth; failures at this depth are not recovered.
    pub max_recovery_depth: usize,
    pub pattern_matching: bool,
    pub recovery_policy: RecoveryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_retry_budget: DEFAULT_RETRY_BUDGET,
            action_timeout_ms: 30_000,
            snapshot_timeout_ms: 10_000,
            oracle_timeout_ms: 60_000,
            max_recovery_depth: 4,
            pattern_matching: true,
            recovery_policy: RecoveryPolicy::Recheck,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("action_timeout_ms", self.action_timeout_ms),
            ("snapshot_timeout_ms", self.snapshot_timeout_ms),
            ("oracle_timeout_ms", self.oracle_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }
        if self.max_recovery_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_recovery_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn plan_defaults(&self) -> PlanDefaults {
        PlanDefaults {
            retry_budget: self.default_retry_budget,
            continue_on_error: false,
        }
    }
}
