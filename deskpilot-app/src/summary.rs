//! Human-readable rendering of a finished run.

use deskpilot_core::{ExecutionRecord, PlanSource, RunState};

fn source(state: &RunState) -> String {
    match &state.plan_source {
        Some(PlanSource::Template(name)) => format!("template '{}'", name),
        Some(PlanSource::Oracle) => "planner".to_string(),
        Some(PlanSource::Provided) => "caller".to_string(),
        None => "none".to_string(),
    }
}

pub fn render_record(record: &ExecutionRecord) -> String {
    let mut line = format!(
        "{:>3}. {}{} [{}] attempt {} -> {}",
        record.sequence,
        "  ".repeat(record.depth.saturating_sub(1)),
        record.step.label(),
        record.step_id,
        record.attempt_number,
        record.outcome
    );

    if let Some(validation) = &record.validation_result {
        let unmet: Vec<&str> = validation
            .unmet_criteria
            .iter()
            .map(|u| u.criterion.as_str())
            .collect();
        if !unmet.is_empty() {
            line.push_str(&format!(" (unmet: {})", unmet.join(", ")));
        }
    }
    if let Some(detail) = &record.detail {
        line.push_str(&format!(": {}", detail));
    }
    line
}

pub fn render(state: &RunState) -> String {
    let mut out = format!(
        "{} | run {} | plan from {} | {} records\n",
        state.status,
        state.run_id,
        source(state),
        state.execution_log.len()
    );

    for record in &state.execution_log {
        out.push_str(&render_record(record));
        out.push('\n');
    }

    let pending = state.pending_steps();
    if !pending.is_empty() {
        out.push_str(&format!("{} steps not executed\n", pending.len()));
    }
    if let Some(failure) = &state.failure {
        out.push_str(&format!("Failure: {}\n", failure));
    }
    out
}
