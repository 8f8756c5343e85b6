//! Prompt construction and reply extraction for the planner.

use deskpilot_actors::CapabilityDescriptor;
use deskpilot_core::{Snapshot, Step, UnmetCriterion};
use serde_json::{json, Value};

pub const SYSTEM_PROMPT: &str = "You plan desktop automation for a Linux desktop. \
Break the user's instruction into atomic steps, each calling exactly one available action \
with the exact parameters it requires. Give every step success_criteria describing the \
desktop state expected after it runs, keyed by snapshot field path \
(active_application, window_list[0].title, extra_fields.active_workspace, ...). \
A criterion is a literal for equality or an object with one operator: \
equals, not_equals, in, contains, gt, gte, lt, lte, matches, exists, unchanged, changed. \
Reply with JSON only, in the form \
{\"steps\": [{\"actor\": ..., \"action\": ..., \"parameters\": {...}, \"success_criteria\": {...}}]}.";

const CRITERIA_HELP: &str =
    "Steps may also set continue_on_error (bool) and retry_budget (integer).";

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn actions(capabilities: &[CapabilityDescriptor]) -> Value {
    Value::Array(
        capabilities
            .iter()
            .map(|c| {
                json!({
                    "actor": c.namespace,
                    "action": c.verb,
                    "description": c.description,
                    "parameters": c.parameters,
                })
            })
            .collect(),
    )
}

pub fn plan_prompt(
    instruction: &str,
    state: &Snapshot,
    capabilities: &[CapabilityDescriptor],
) -> String {
    format!(
        "Instruction:\n{}\n\nAvailable actions:\n{}\n\nCurrent desktop state:\n{}\n\n{}",
        instruction.trim(),
        pretty(&actions(capabilities)),
        pretty(&state.to_value()),
        CRITERIA_HELP
    )
}

pub fn recovery_prompt(
    step: &Step,
    unmet_criteria: &[UnmetCriterion],
    state: &Snapshot,
) -> String {
    let criteria: serde_json::Map<String, Value> = step
        .success_criteria
        .iter()
        .map(|(path, criterion)| (path.clone(), Value::from(criterion.clone())))
        .collect();
    let failed = json!({
        "actor": step.actor,
        "action": step.action,
        "parameters": step.parameters,
        "success_criteria": criteria,
        "description": step.description,
    });

    format!(
        "A step did not reach its expected state.\n\nFailed step:\n{}\n\nUnmet criteria:\n{}\n\n\
Current desktop state:\n{}\n\n\
Plan the steps that bring the desktop into the state the failed step expected. \
Do not repeat the failed step unless repeating it is the correction. \
Reply with {{\"steps\": []}} if no correction is possible.",
        pretty(&failed),
        pretty(&json!(unmet_criteria)),
        pretty(&state.to_value())
    )
}

/// Finds the JSON document in a model reply, tolerating code fences and
/// surrounding prose.
pub fn extract_json(reply: &str) -> Option<Value> {
    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(start) = trimmed.find("```") {
        let body = &trimmed[start + 3..];
        let body = body.strip_prefix("json").unwrap_or(body);
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    let open = trimmed.find(['{', '['])?;
    let close = trimmed.rfind(['}', ']'])?;
    if close <= open {
        return None;
    }
    serde_json::from_str(&trimmed[open..=close]).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use deskpilot_core::Criterion;

    #[test]
    fn test_extract_plain_json() {
        assert_eq!(extract_json(" {\"steps\": []} ").unwrap(), json!({"steps": []}));
    }

    #[test]
    fn test_extract_fenced_json() {
        let reply =
            "Here is the plan:\n```json\n{\"steps\": [{\"actor\": \"system\"}]}\n```\nDone.";
        assert_eq!(
            extract_json(reply).unwrap(),
            json!({"steps": [{"actor": "system"}]})
        );
    }

    #[test]
    fn test_extract_embedded_json() {
        let reply = "Sure. [{\"actor\": \"system\", \"action\": \"wait\"}] hope that helps";
        assert_eq!(
            extract_json(reply).unwrap(),
            json!([{"actor": "system", "action": "wait"}])
        );
        assert!(extract_json("no plan here").is_none());
    }

    #[test]
    fn test_plan_prompt_lists_actions() {
        let capability = CapabilityDescriptor::new(
            &deskpilot_actors::ActorKey::new("hyprland", "workspace"),
            "Switch to a workspace",
        );
        let prompt = plan_prompt("go to workspace 2", &Snapshot::unavailable(), &[capability]);
        assert!(prompt.contains("go to workspace 2"));
        assert!(prompt.contains("\"actor\": \"hyprland\""));
        assert!(prompt.contains("\"action\": \"workspace\""));
    }

    #[test]
    fn test_recovery_prompt_includes_failures() {
        let step = Step::new("hyprland", "focus_window")
            .with_criterion("active_application", Criterion::Equals(json!("firefox")));
        let unmet = vec![UnmetCriterion {
            criterion: "active_application".to_string(),
            expected: json!("firefox"),
            actual: Some(json!("kitty")),
        }];
        let prompt = recovery_prompt(&step, &unmet, &Snapshot::unavailable());
        assert!(prompt.contains("focus_window"));
        assert!(prompt.contains("\"actual\": \"kitty\""));
    }
}
