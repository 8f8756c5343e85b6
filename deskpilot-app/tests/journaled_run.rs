//! Runs the engine with the built-in actors and templates, journaling to disk.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::Utc;
use deskpilot_actors::{register_builtin, ActorRegistry, CapabilityDescriptor};
use deskpilot_app::{summary, JsonlRecordSink};
use deskpilot_core::pattern_library::default_matcher;
use deskpilot_core::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

struct StillDesktop;

#[async_trait]
impl SnapshotProvider for StillDesktop {
    async fn capture(&self) -> Result<Snapshot, SnapshotError> {
        Ok(Snapshot::new(Utc::now()).with_active_application("kitty"))
    }
}

/// Never has a correction to offer.
struct ShrugOracle;

#[async_trait]
impl PlanningOracle for ShrugOracle {
    async fn plan(
        &self,
        _instruction: &str,
        _state: &Snapshot,
        _available_actions: &[CapabilityDescriptor],
    ) -> Result<Plan, OracleError> {
        Err(OracleError::Unavailable("offline".to_string()))
    }

    async fn recover(
        &self,
        _step: &Step,
        _unmet_criteria: &[UnmetCriterion],
        _state: &Snapshot,
    ) -> Result<Plan, OracleError> {
        Ok(Plan::empty())
    }
}

fn engine(journal: Arc<JsonlRecordSink>) -> ExecutionEngine {
    let mut registry = ActorRegistry::new();
    register_builtin(&mut registry).unwrap();
    ExecutionEngine::new(
        Arc::new(registry),
        Arc::new(StillDesktop),
        Arc::new(ShrugOracle),
        EngineConfig::default(),
    )
    .with_patterns(Arc::new(default_matcher(PlanDefaults::default()).unwrap()))
    .with_sink(journal)
}

fn journal_lines(sink: &JsonlRecordSink) -> Vec<Value> {
    std::fs::read_to_string(sink.path())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_journal_matches_execution_log() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(JsonlRecordSink::new(dir.path().join("runs.jsonl")).unwrap());
    let engine = engine(sink.clone());

    let plan = Plan::new(vec![
        Step::new("system", "wait").with_param("duration_ms", json!(5)),
        Step::new("system", "wait")
            .with_param("duration_ms", json!(5))
            .with_criterion("active_application", Criterion::Equals(json!("firefox")))
            .with_retry_budget(2)
            .continue_on_error(true),
        Step::new("system", "wait")
            .with_param("duration_ms", json!(5))
            .with_criterion("active_application", Criterion::Equals(json!("kitty"))),
    ]);

    let state = engine
        .execute_plan("settle", plan, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(state.status, RunStatus::Succeeded);
    let outcomes: Vec<StepOutcome> = state.execution_log.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Success,
            StepOutcome::ValidationFailure,
            StepOutcome::NoCorrection,
            StepOutcome::SkippedAfterExhaustion,
            StepOutcome::Success,
        ]
    );

    let lines = journal_lines(&sink);
    assert_eq!(lines.len(), state.execution_log.len());
    for (line, record) in lines.iter().zip(&state.execution_log) {
        assert_eq!(line["run_id"], state.run_id.as_str());
        assert_eq!(line["record"]["sequence"], record.sequence);
    }

    let text = summary::render(&state);
    assert!(text.starts_with("Succeeded | "));
    assert!(text.contains("-> SkippedAfterExhaustion"));
    assert!(text.contains("(unmet: active_application)"));
}

#[tokio::test]
async fn test_template_run_skips_planner() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(JsonlRecordSink::new(dir.path().join("runs.jsonl")).unwrap());
    let engine = engine(sink.clone());

    let state = engine
        .run("wait 1 second", &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(state.status, RunStatus::Succeeded);
    assert_eq!(
        state.plan_source,
        Some(PlanSource::Template("wait_seconds".to_string()))
    );
    assert_eq!(journal_lines(&sink).len(), 1);
    assert_eq!(engine.metrics().snapshot().pattern_hits, 1);
}

#[tokio::test]
async fn test_unplannable_instruction_fails_without_records() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(JsonlRecordSink::new(dir.path().join("runs.jsonl")).unwrap());
    let engine = engine(sink.clone());

    let state = engine
        .run("rearrange my whole desktop", &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.execution_log.is_empty());
    assert!(journal_lines(&sink).is_empty());
    assert!(summary::render(&state).contains("Failure: Planning unavailable"));
}
