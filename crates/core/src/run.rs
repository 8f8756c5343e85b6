use crate::planning::Plan;
use crate::types::{ExecutionRecord, RunStatus, Snapshot, Step, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation signal, checked by the engine between steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedStep {
    pub id: StepId,
    pub step: Step,
}

/// A failed step waiting on its recovery segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecheck {
    pub failed: QueuedStep,
    /// Snapshot taken before the failed step ran, if one was captured.
    pub before: Option<Snapshot>,
}

/// One level of the plan stack: the top-level plan or a recovery segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSegment {
    pub steps: Vec<QueuedStep>,
    /// Index of the next step to execute.
    pub cursor: usize,
    pub recovering: Option<PendingRecheck>,
}

impl PlanSegment {
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Steps not yet executed.
    pub fn remaining(&self) -> &[QueuedStep] {
        self.steps.get(self.cursor..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanSource {
    Oracle,
    Template(String),
    Provided,
}

/// All mutable state of a single run. Owned by one engine call; nothing here
/// is shared between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub instruction: String,
    pub plan_stack: Vec<PlanSegment>,
    pub execution_log: Vec<ExecutionRecord>,
    pub retry_counts: HashMap<StepId, u32>,
    pub status: RunStatus,
    /// Why the run failed when no record explains it (initial planning).
    pub failure: Option<String>,
    pub last_snapshot: Option<Snapshot>,
    pub plan_source: Option<PlanSource>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    next_step_id: u64,
}

impl RunState {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            instruction: instruction.into(),
            plan_stack: Vec::new(),
            execution_log: Vec::new(),
            retry_counts: HashMap::new(),
            status: RunStatus::Running,
            failure: None,
            last_snapshot: None,
            plan_source: None,
            started_at: Utc::now(),
            finished_at: None,
            next_step_id: 0,
        }
    }

    /// Pushes a plan as a new segment, assigning fresh step ids.
    pub fn push_segment(&mut self, plan: Plan, recovering: Option<PendingRecheck>) {
        let steps = plan
            .steps
            .into_iter()
            .map(|step| {
                self.next_step_id += 1;
                QueuedStep {
                    id: StepId(self.next_step_id),
                    step,
                }
            })
            .collect();

        self.plan_stack.push(PlanSegment {
            steps,
            cursor: 0,
            recovering,
        });
    }

    pub fn depth(&self) -> usize {
        self.plan_stack.len()
    }

    pub fn retry_count(&self, id: StepId) -> u32 {
        self.retry_counts.get(&id).copied().unwrap_or(0)
    }

    pub fn bump_retry(&mut self, id: StepId) -> u32 {
        let count = self.retry_counts.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    pub fn finish(&mut self, status: RunStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(reason.into());
        }
        self.finish(RunStatus::Failed);
    }

    /// Unexecuted steps across every segment, innermost first.
    pub fn pending_steps(&self) -> Vec<&QueuedStep> {
        self.plan_stack
            .iter()
            .rev()
            .flat_map(|segment| segment.remaining())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_step_ids_unique_across_segments() {
        let mut state = RunState::new("test");
        state.push_segment(
            Plan::new(vec![Step::new("a", "one"), Step::new("a", "two")]),
            None,
        );
        state.push_segment(Plan::new(vec![Step::new("b", "one")]), None);

        let ids: Vec<StepId> = state.pending_steps().iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![StepId(3), StepId(1), StepId(2)]);
        assert_eq!(state.depth(), 2);
    }

    #[test]
    fn test_retry_counts() {
        let mut state = RunState::new("test");
        assert_eq!(state.retry_count(StepId(1)), 0);
        assert_eq!(state.bump_retry(StepId(1)), 1);
        assert_eq!(state.bump_retry(StepId(1)), 2);
        assert_eq!(state.retry_count(StepId(2)), 0);
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut state = RunState::new("test");
        state.fail("planner down");
        state.finish(RunStatus::Succeeded);
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.failure.as_deref(), Some("planner down"));
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
