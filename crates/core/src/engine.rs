//! The plan execution engine.
//!
//! A run walks an explicit stack of plan segments. The bottom segment is the
//! initial plan; each recovery plan is pushed on top and runs to completion
//! before the segment below resumes. Step failures never escape as errors:
//! they become [`ExecutionRecord`]s and drive the retry/recover/abort
//! decisions made here.

use crate::config::{EngineConfig, RecoveryPolicy};
use crate::interfaces::{OracleError, PlanningOracle, RecordSink, SnapshotError, SnapshotProvider};
use crate::metrics::Metrics;
use crate::patterns::PatternMatcher;
use crate::planning::{Plan, PlanError};
use crate::run::{CancellationFlag, PendingRecheck, PlanSource, QueuedStep, RunState};
use crate::sink::NullRecordSink;
use crate::types::{
    ExecutionRecord, RunStatus, Snapshot, StepOutcome, UnmetCriterion, ValidationResult,
};
use crate::validator::StateValidator;
use chrono::Utc;
use deskpilot_actors::{Actor, ActorRegistry, Parameters};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Defects no retry policy can handle. Everything else is recorded in the run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed plan: {0}")]
    MalformedPlan(#[from] PlanError),
}

pub struct ExecutionEngine {
    registry: Arc<ActorRegistry>,
    snapshots: Arc<dyn SnapshotProvider>,
    oracle: Arc<dyn PlanningOracle>,
    patterns: Option<Arc<PatternMatcher>>,
    sink: Arc<dyn RecordSink>,
    validator: StateValidator,
    config: EngineConfig,
    metrics: Arc<Metrics>,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<ActorRegistry>,
        snapshots: Arc<dyn SnapshotProvider>,
        oracle: Arc<dyn PlanningOracle>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            snapshots,
            oracle,
            patterns: None,
            sink: Arc::new(NullRecordSink),
            validator: StateValidator::new(),
            config,
            metrics: Metrics::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: Arc<PatternMatcher>) -> Self {
        self.patterns = Some(patterns);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Plans `instruction` (template first, then the planner) and executes it.
    ///
    /// Always returns a terminal [`RunState`] unless a plan fails structural
    /// validation.
    pub async fn run(
        &self,
        instruction: &str,
        cancel: &CancellationFlag,
    ) -> Result<RunState, EngineError> {
        let mut state = RunState::new(instruction);
        self.metrics.inc_runs_started();
        info!("Starting run {}: {}", state.run_id, instruction);

        match self.initial_plan(&mut state).await {
            Some(plan) => self.start(state, plan, cancel).await,
            None => {
                self.finish_run(&state);
                Ok(state)
            }
        }
    }

    /// Executes a plan supplied by the caller, skipping initial planning.
    pub async fn execute_plan(
        &self,
        instruction: &str,
        plan: Plan,
        cancel: &CancellationFlag,
    ) -> Result<RunState, EngineError> {
        let mut state = RunState::new(instruction);
        state.plan_source = Some(PlanSource::Provided);
        self.metrics.inc_runs_started();
        info!("Starting run {} with provided plan ({} steps)", state.run_id, plan.len());
        self.start(state, plan, cancel).await
    }

    async fn initial_plan(&self, state: &mut RunState) -> Option<Plan> {
        if self.config.pattern_matching {
            if let Some(hit) = self
                .patterns
                .as_ref()
                .and_then(|matcher| matcher.match_instruction(&state.instruction))
            {
                info!("Using template {} ({} steps)", hit.template, hit.plan.len());
                self.metrics.inc_pattern_hits();
                state.plan_source = Some(PlanSource::Template(hit.template));
                return Some(hit.plan);
            }
        }

        let snapshot = match self.capture().await {
            Ok(snapshot) => {
                state.last_snapshot = Some(snapshot.clone());
                snapshot
            }
            Err(e) => {
                warn!("Planning without desktop state: {}", e);
                Snapshot::unavailable()
            }
        };

        let capabilities = self.registry.capabilities();
        let instruction = state.instruction.clone();
        match self
            .with_oracle_deadline(self.oracle.plan(&instruction, &snapshot, &capabilities))
            .await
        {
            Ok(plan) => {
                debug!("Planner returned {} steps", plan.len());
                state.plan_source = Some(PlanSource::Oracle);
                Some(plan)
            }
            Err(e) => {
                error!("Initial planning failed: {}", e);
                self.metrics.inc_oracle_failures();
                state.fail(format!("Planning unavailable: {}", e));
                None
            }
        }
    }

    async fn start(
        &self,
        mut state: RunState,
        plan: Plan,
        cancel: &CancellationFlag,
    ) -> Result<RunState, EngineError> {
        plan.validate()?;
        state.push_segment(plan, None);
        self.drive(&mut state, cancel).await?;
        self.finish_run(&state);
        Ok(state)
    }

    async fn drive(
        &self,
        state: &mut RunState,
        cancel: &CancellationFlag,
    ) -> Result<(), EngineError> {
        loop {
            if state.status.is_terminal() {
                return Ok(());
            }

            let Some(segment) = state.plan_stack.last_mut() else {
                state.finish(RunStatus::Succeeded);
                return Ok(());
            };

            if segment.is_exhausted() && segment.recovering.is_none() {
                state.plan_stack.pop();
                continue;
            }

            if cancel.is_cancelled() {
                info!("Run {} cancelled", state.run_id);
                state.finish(RunStatus::Aborted);
                return Ok(());
            }

            if segment.is_exhausted() {
                let pending = state
                    .plan_stack
                    .pop()
                    .and_then(|finished| finished.recovering);
                if let Some(pending) = pending {
                    self.close_recovery(state, pending).await?;
                }
                continue;
            }

            let queued = segment.steps[segment.cursor].clone();
            segment.cursor += 1;
            self.execute_step(state, queued).await?;
        }
    }

    async fn execute_step(
        &self,
        state: &mut RunState,
        queued: QueuedStep,
    ) -> Result<(), EngineError> {
        let attempt = state.retry_count(queued.id) + 1;
        let label = queued.step.label();
        self.metrics.inc_step_attempts();
        info!("Executing {} {} (attempt {})", queued.id, label, attempt);

        let actor = match self.registry.resolve(&queued.step.actor, &queued.step.action) {
            Ok(actor) => actor,
            Err(e) => {
                warn!("{}", e);
                self.metrics.inc_step_failures();
                let continue_on_error = queued.step.continue_on_error;
                self.record(
                    state,
                    &queued,
                    attempt,
                    None,
                    StepOutcome::ActorMissing,
                    Some(e.to_string()),
                );
                if !continue_on_error {
                    state.fail(e.to_string());
                }
                return Ok(());
            }
        };

        let before = match self.capture().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return self
                    .handle_failure(
                        state,
                        queued,
                        None,
                        actuation_failure(&e),
                        StepOutcome::ActuationError,
                        Some(e.to_string()),
                    )
                    .await
            }
        };
        state.last_snapshot = Some(before.clone());

        if let Err(message) = self.invoke(&queued, actor).await {
            warn!("{} failed: {}", label, message);
            let validation =
                ValidationResult::from_unmet(vec![UnmetCriterion::actuation(&message)]);
            return self
                .handle_failure(
                    state,
                    queued,
                    Some(before),
                    validation,
                    StepOutcome::ActuationError,
                    Some(message),
                )
                .await;
        }

        let after = match self.capture().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return self
                    .handle_failure(
                        state,
                        queued,
                        Some(before),
                        actuation_failure(&e),
                        StepOutcome::ActuationError,
                        Some(e.to_string()),
                    )
                    .await
            }
        };
        state.last_snapshot = Some(after.clone());

        let result = self
            .validator
            .validate(&queued.step.success_criteria, &before, &after);

        if result.passed {
            debug!("{} passed validation", label);
            self.record(state, &queued, attempt, Some(result), StepOutcome::Success, None);
            Ok(())
        } else {
            info!(
                "{} left {} criteria unmet",
                label,
                result.unmet_criteria.len()
            );
            self.handle_failure(
                state,
                queued,
                Some(before),
                result,
                StepOutcome::ValidationFailure,
                None,
            )
            .await
        }
    }

    /// Runs the actor in its own task under the action timeout. Panics are
    /// reported as errors.
    async fn invoke(&self, queued: &QueuedStep, actor: Arc<dyn Actor>) -> Result<Value, String> {
        if let Some(capability) = self
            .registry
            .capability(&queued.step.actor, &queued.step.action)
        {
            capability
                .check_parameters(&queued.step.parameters)
                .map_err(|e| e.to_string())?;
        }

        let parameters: Parameters = queued.step.parameters.clone();
        let handle = tokio::spawn(async move { actor.execute(&parameters).await });
        let abort = handle.abort_handle();

        match timeout(self.config.action_timeout(), handle).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_err)) if join_err.is_panic() => {
                error!("Actor {} panicked", queued.step.label());
                Err("actor panicked".to_string())
            }
            Ok(Err(join_err)) => Err(format!("actor task failed: {}", join_err)),
            Err(_) => {
                abort.abort();
                Err(format!(
                    "actor timed out after {} ms",
                    self.config.action_timeout_ms
                ))
            }
        }
    }

    /// Charges a failure to the step and either requests a recovery plan or
    /// gives up on the step.
    async fn handle_failure(
        &self,
        state: &mut RunState,
        queued: QueuedStep,
        before: Option<Snapshot>,
        validation: ValidationResult,
        outcome: StepOutcome,
        detail: Option<String>,
    ) -> Result<(), EngineError> {
        let label = queued.step.label();
        let mut outcome = outcome;
        let mut detail = detail;

        self.metrics.inc_step_failures();
        loop {
            let count = state.bump_retry(queued.id);
            let too_deep = state.depth() >= self.config.max_recovery_depth;

            if count > queued.step.retry_budget || too_deep {
                let reason = if too_deep {
                    format!("recovery depth {} reached", self.config.max_recovery_depth)
                } else {
                    format!("retry budget {} exhausted", queued.step.retry_budget)
                };
                let detail = match &detail {
                    Some(d) => format!("{} after {}: {}", reason, outcome, d),
                    None => format!("{} after {}", reason, outcome),
                };

                if queued.step.continue_on_error {
                    warn!("Skipping {}: {}", label, reason);
                    self.record(
                        state,
                        &queued,
                        count,
                        Some(validation),
                        StepOutcome::SkippedAfterExhaustion,
                        Some(detail),
                    );
                } else {
                    error!("Giving up on {}: {}", label, reason);
                    self.record(
                        state,
                        &queued,
                        count,
                        Some(validation),
                        StepOutcome::RetryBudgetExhausted,
                        Some(detail.clone()),
                    );
                    state.fail(format!("{}: {}", label, detail));
                }
                return Ok(());
            }

            self.record(state, &queued, count, Some(validation.clone()), outcome, detail.clone());

            self.metrics.inc_recoveries_requested();
            info!(
                "Requesting recovery for {} ({}/{})",
                label, count, queued.step.retry_budget
            );
            let snapshot = state
                .last_snapshot
                .clone()
                .unwrap_or_else(Snapshot::unavailable);

            let plan = match self
                .with_oracle_deadline(self.oracle.recover(
                    &queued.step,
                    &validation.unmet_criteria,
                    &snapshot,
                ))
                .await
            {
                Ok(plan) => plan,
                Err(e) => {
                    error!("Recovery planning for {} failed: {}", label, e);
                    self.metrics.inc_oracle_failures();
                    self.record(
                        state,
                        &queued,
                        count,
                        None,
                        StepOutcome::PlanningUnavailable,
                        Some(e.to_string()),
                    );
                    state.fail(format!("Planning unavailable: {}", e));
                    return Ok(());
                }
            };

            if plan.is_empty() {
                warn!("Planner has no correction for {}", label);
                outcome = StepOutcome::NoCorrection;
                detail = Some("planner returned an empty recovery plan".to_string());
                continue;
            }

            plan.validate()?;
            debug!("Pushing {}-step recovery segment for {}", plan.len(), label);
            state.push_segment(
                plan,
                Some(PendingRecheck {
                    failed: queued,
                    before,
                }),
            );
            return Ok(());
        }
    }

    /// Called once a recovery segment has run to completion.
    async fn close_recovery(
        &self,
        state: &mut RunState,
        pending: PendingRecheck,
    ) -> Result<(), EngineError> {
        let PendingRecheck { failed, before } = pending;
        let attempt = state.retry_count(failed.id) + 1;

        if self.config.recovery_policy == RecoveryPolicy::TrustSegment {
            info!("{} resolved by recovery segment", failed.step.label());
            self.record(
                state,
                &failed,
                attempt,
                None,
                StepOutcome::Recovered,
                Some("recovery segment completed".to_string()),
            );
            return Ok(());
        }

        self.metrics.inc_step_attempts();
        let after = match self.capture().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return self
                    .handle_failure(
                        state,
                        failed,
                        before,
                        actuation_failure(&e),
                        StepOutcome::ActuationError,
                        Some(e.to_string()),
                    )
                    .await
            }
        };
        state.last_snapshot = Some(after.clone());

        let criteria = &failed.step.success_criteria;
        let result = match &before {
            Some(before) => self.validator.validate(criteria, before, &after),
            None => self.validator.validate_without_baseline(criteria, &after),
        };

        if result.passed {
            info!("{} recovered", failed.step.label());
            self.record(state, &failed, attempt, Some(result), StepOutcome::Recovered, None);
            Ok(())
        } else {
            self.handle_failure(
                state,
                failed,
                before,
                result,
                StepOutcome::ValidationFailure,
                Some("criteria still unmet after recovery".to_string()),
            )
            .await
        }
    }

    async fn capture(&self) -> Result<Snapshot, SnapshotError> {
        match timeout(self.config.snapshot_timeout(), self.snapshots.capture()).await {
            Ok(result) => result,
            Err(_) => Err(SnapshotError::Timeout(self.config.snapshot_timeout_ms)),
        }
    }

    async fn with_oracle_deadline<F>(&self, call: F) -> Result<Plan, OracleError>
    where
        F: Future<Output = Result<Plan, OracleError>>,
    {
        match timeout(self.config.oracle_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.config.oracle_timeout_ms)),
        }
    }

    fn record(
        &self,
        state: &mut RunState,
        queued: &QueuedStep,
        attempt: u32,
        validation: Option<ValidationResult>,
        outcome: StepOutcome,
        detail: Option<String>,
    ) {
        let record = ExecutionRecord {
            sequence: state.execution_log.len(),
            step_id: queued.id,
            step: queued.step.clone(),
            depth: state.depth(),
            attempt_number: attempt,
            validation_result: validation,
            outcome,
            detail,
            recorded_at: Utc::now(),
        };

        if let Err(e) = self.sink.append(&state.run_id, &record) {
            warn!(
                "Failed to persist record {} of run {}: {}",
                record.sequence, state.run_id, e
            );
        }
        state.execution_log.push(record);
    }

    fn finish_run(&self, state: &RunState) {
        match state.status {
            RunStatus::Succeeded => self.metrics.inc_runs_succeeded(),
            RunStatus::Failed => self.metrics.inc_runs_failed(),
            RunStatus::Aborted => self.metrics.inc_runs_aborted(),
            RunStatus::Running => {}
        }
        info!(
            "Run {} finished: {} ({} records)",
            state.run_id,
            state.status,
            state.execution_log.len()
        );
    }
}

fn actuation_failure(error: &SnapshotError) -> ValidationResult {
    ValidationResult::from_unmet(vec![UnmetCriterion::actuation(&error.to_string())])
}
