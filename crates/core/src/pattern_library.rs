//! Built-in templates for common desktop instructions.

use crate::criteria::Criterion;
use crate::patterns::{Bindings, PatternError, PatternMatcher, Template};
use crate::planning::{Plan, PlanDefaults};
use crate::types::Step;
use serde_json::json;

/// Settle time after launching an application.
const LAUNCH_SETTLE_MS: u64 = 1500;

fn workspace(bindings: &Bindings) -> Result<Plan, PatternError> {
    let raw = bindings.get("id")?;
    let id: u64 = raw.parse().map_err(|_| PatternError::InvalidBinding {
        name: "id".to_string(),
        reason: format!("'{}' is not a workspace number", raw),
    })?;

    Ok(Plan::new(vec![Step::new("hyprland", "workspace")
        .with_param("id", json!(id))
        .with_criterion(
            "extra_fields.active_workspace",
            Criterion::Equals(json!(id)),
        )
        .with_description(format!("Switch to workspace {}", id))]))
}

fn launch(bindings: &Bindings) -> Result<Plan, PatternError> {
    let app = bindings.get("app")?;
    let class_pattern = format!("(?i){}", regex::escape(app));

    Ok(Plan::new(vec![
        Step::new("hyprland", "exec")
            .with_param("command", json!(app))
            .with_description(format!("Launch {}", app)),
        Step::new("system", "wait")
            .with_param("duration_ms", json!(LAUNCH_SETTLE_MS))
            .with_criterion("active_application", Criterion::Matches(class_pattern))
            .with_description(format!("Wait for {} to take focus", app)),
    ]))
}

fn focus(bindings: &Bindings) -> Result<Plan, PatternError> {
    let app = bindings.get("app")?;
    if !app
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
    {
        return Err(PatternError::InvalidBinding {
            name: "app".to_string(),
            reason: format!("'{}' is not a window class", app),
        });
    }

    Ok(Plan::new(vec![Step::new("hyprland", "focus_window")
        .with_param("window", json!(format!("class:{}", app)))
        .with_criterion(
            "active_application",
            Criterion::Matches(format!("(?i)^{}$", regex::escape(app))),
        )
        .with_description(format!("Focus {}", app))]))
}

fn wait(bindings: &Bindings) -> Result<Plan, PatternError> {
    let raw = bindings.get("seconds")?;
    let seconds: u64 = raw.parse().map_err(|_| PatternError::InvalidBinding {
        name: "seconds".to_string(),
        reason: format!("'{}' is not a number of seconds", raw),
    })?;

    Ok(Plan::new(vec![Step::new("system", "wait")
        .with_param("duration_ms", json!(seconds * 1000))
        .with_description(format!("Wait {} seconds", seconds))]))
}

type Build = fn(&Bindings) -> Result<Plan, PatternError>;

fn with_defaults(
    defaults: PlanDefaults,
    build: Build,
) -> impl Fn(&Bindings) -> Result<Plan, PatternError> + Send + Sync + 'static {
    move |bindings: &Bindings| build(bindings).map(|plan| plan.with_defaults(&defaults))
}

/// Matcher preloaded with the built-in templates. Template steps take their
/// retry budget and error policy from `defaults`.
pub fn default_matcher(defaults: PlanDefaults) -> Result<PatternMatcher, PatternError> {
    let mut matcher = PatternMatcher::new();
    matcher
        .register(Template::new(
            "switch_workspace",
            r"(?i)^(?:switch|go)\s+to\s+workspace\s+(?P<id>\d+)$",
            with_defaults(defaults, workspace),
        )?)?
        .register(Template::new(
            "launch_application",
            r"(?i)^(?:open|launch|start)\s+(?P<app>[\w.\-]+)$",
            with_defaults(defaults, launch),
        )?)?
        .register(Template::new(
            "focus_application",
            r"(?i)^(?:focus|switch\s+to)\s+(?P<app>[\w.\-]+)$",
            with_defaults(defaults, focus),
        )?)?
        .register(Template::new(
            "wait_seconds",
            r"(?i)^wait\s+(?:for\s+)?(?P<seconds>\d{1,2})\s+seconds?$",
            with_defaults(defaults, wait),
        )?)?;
    Ok(matcher)
}
