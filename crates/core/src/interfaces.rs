//! External collaborators of the execution engine.

use crate::planning::Plan;
use crate::types::{ExecutionRecord, Snapshot, Step, UnmetCriterion};
use async_trait::async_trait;
use deskpilot_actors::CapabilityDescriptor;
use thiserror::Error;

/// Planner errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Planner unavailable: {0}")]
    Unavailable(String),

    #[error("Planner returned a malformed plan: {0}")]
    Malformed(String),

    #[error("Planner timed out after {0} ms")]
    Timeout(u64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Snapshot capture failed: {0}")]
    Capture(String),

    #[error("Snapshot capture timed out after {0} ms")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Produces plans from instructions and recovery plans from failures.
#[async_trait]
pub trait PlanningOracle: Send + Sync {
    /// Plan an instruction against the current desktop state.
    async fn plan(
        &self,
        instruction: &str,
        state: &Snapshot,
        available_actions: &[CapabilityDescriptor],
    ) -> Result<Plan, OracleError>;

    /// Plan a correction for a step whose criteria were not met.
    async fn recover(
        &self,
        step: &Step,
        unmet_criteria: &[UnmetCriterion],
        state: &Snapshot,
    ) -> Result<Plan, OracleError>;
}

/// Captures the current desktop state. Read-only.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn capture(&self) -> Result<Snapshot, SnapshotError>;
}

/// Append-only consumer of execution records.
pub trait RecordSink: Send + Sync {
    fn append(&self, run_id: &str, record: &ExecutionRecord) -> Result<(), SinkError>;
}
