//! Hyprland window-manager actors, driven through `hyprctl dispatch`.

use crate::traits::{Actor, ActorError, ActorKey, CapabilityDescriptor, Parameters};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

pub const NAMESPACE: &str = "hyprland";

fn validate_workspace_id(id: u64) -> Result<(), ActorError> {
    if id == 0 {
        return Err(ActorError::InvalidArgument(
            "workspace id must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_window_selector(selector: &str) -> Result<(), ActorError> {
    if selector.is_empty() {
        return Err(ActorError::InvalidArgument(
            "window selector cannot be empty".to_string(),
        ));
    }
    if !selector
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, ':' | '_' | '-' | '.'))
    {
        return Err(ActorError::InvalidArgument(
            "window selector contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_exec_command(command: &str) -> Result<(), ActorError> {
    if command.trim().is_empty() {
        return Err(ActorError::InvalidArgument(
            "command cannot be empty".to_string(),
        ));
    }
    if command.contains('\n') || command.contains('\0') {
        return Err(ActorError::InvalidArgument(
            "command contains invalid control characters".to_string(),
        ));
    }
    Ok(())
}

fn string_param<'a>(parameters: &'a Parameters, name: &str) -> Result<&'a str, ActorError> {
    parameters
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ActorError::InvalidArgument(format!("Missing '{}' field", name)))
}

/// Workspace ids arrive as numbers or numeric strings depending on the planner.
fn workspace_param(parameters: &Parameters) -> Result<u64, ActorError> {
    let id = match parameters.get("id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ActorError::InvalidArgument("Missing or invalid 'id' field".to_string()))?;
    validate_workspace_id(id)?;
    Ok(id)
}

/// Which `hyprctl dispatch` command an actor maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Workspace,
    FocusWindow,
    CloseWindow,
    Exec,
}

impl Dispatch {
    pub const ALL: [Dispatch; 4] = [
        Dispatch::Workspace,
        Dispatch::FocusWindow,
        Dispatch::CloseWindow,
        Dispatch::Exec,
    ];

    pub fn verb(self) -> &'static str {
        match self {
            Dispatch::Workspace => "workspace",
            Dispatch::FocusWindow => "focus_window",
            Dispatch::CloseWindow => "close_window",
            Dispatch::Exec => "exec",
        }
    }

    pub fn key(self) -> ActorKey {
        ActorKey::new(NAMESPACE, self.verb())
    }

    pub fn capability(self) -> CapabilityDescriptor {
        let key = self.key();
        match self {
            Dispatch::Workspace => CapabilityDescriptor::new(&key, "Switch to a workspace")
                .with_parameters(
                    json!({
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer", "description": "Workspace number (>= 1)" }
                        },
                        "required": ["id"]
                    }),
                    &["id"],
                ),
            Dispatch::FocusWindow => CapabilityDescriptor::new(&key, "Focus a window")
                .with_parameters(
                    json!({
                        "type": "object",
                        "properties": {
                            "window": { "type": "string", "description": "Window selector, e.g. class:firefox" }
                        },
                        "required": ["window"]
                    }),
                    &["window"],
                ),
            Dispatch::CloseWindow => CapabilityDescriptor::new(&key, "Close a window")
                .with_parameters(
                    json!({
                        "type": "object",
                        "properties": {
                            "window": { "type": "string", "description": "Window selector, e.g. class:firefox" }
                        },
                        "required": ["window"]
                    }),
                    &["window"],
                ),
            Dispatch::Exec => CapabilityDescriptor::new(&key, "Launch a program inside the compositor")
                .with_parameters(
                    json!({
                        "type": "object",
                        "properties": {
                            "command": { "type": "string", "description": "Command line to launch" }
                        },
                        "required": ["command"]
                    }),
                    &["command"],
                ),
        }
    }

    /// Builds the argument vector for `hyprctl`.
    pub fn arguments(self, parameters: &Parameters) -> Result<Vec<String>, ActorError> {
        let tail = match self {
            Dispatch::Workspace => vec!["workspace".to_string(), workspace_param(parameters)?.to_string()],
            Dispatch::FocusWindow => {
                let window = string_param(parameters, "window")?;
                validate_window_selector(window)?;
                vec!["focuswindow".to_string(), window.to_string()]
            }
            Dispatch::CloseWindow => {
                let window = string_param(parameters, "window")?;
                validate_window_selector(window)?;
                vec!["closewindow".to_string(), window.to_string()]
            }
            Dispatch::Exec => {
                let command = string_param(parameters, "command")?;
                validate_exec_command(command)?;
                vec!["exec".to_string(), command.to_string()]
            }
        };

        let mut args = vec!["dispatch".to_string()];
        args.extend(tail);
        Ok(args)
    }
}

pub struct HyprctlActor {
    dispatch: Dispatch,
}

impl HyprctlActor {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }
}

#[async_trait]
impl Actor for HyprctlActor {
    async fn execute(&self, parameters: &Parameters) -> Result<Value, ActorError> {
        let args = self.dispatch.arguments(parameters)?;
        tracing::debug!("hyprctl {}", args.join(" "));

        let output = Command::new("hyprctl").args(&args).output().await?;

        if !output.status.success() {
            return Err(ActorError::OperationFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        // hyprctl exits 0 on dispatch errors and reports them on stdout
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.to_lowercase().starts_with("err") || stdout.contains("Invalid") {
            return Err(ActorError::OperationFailed(stdout));
        }

        Ok(json!({ "dispatch": self.dispatch.verb(), "output": stdout }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_workspace_arguments_accept_string_ids() {
        let args = Dispatch::Workspace.arguments(&params(json!({"id": "3"}))).unwrap();
        assert_eq!(args, vec!["dispatch", "workspace", "3"]);
    }

    #[test]
    fn test_workspace_zero_rejected() {
        let err = Dispatch::Workspace.arguments(&params(json!({"id": 0}))).unwrap_err();
        assert!(matches!(err, ActorError::InvalidArgument(_)));
    }

    #[test]
    fn test_window_selector_validation() {
        assert!(Dispatch::FocusWindow
            .arguments(&params(json!({"window": "class:firefox"})))
            .is_ok());
        assert!(Dispatch::CloseWindow
            .arguments(&params(json!({"window": "class:fire fox;rm"})))
            .is_err());
    }

    #[test]
    fn test_exec_rejects_newlines() {
        let err = Dispatch::Exec
            .arguments(&params(json!({"command": "kitty\nrm -rf ~"})))
            .unwrap_err();
        assert!(err.to_string().contains("control characters"));
    }

    #[test]
    fn test_capabilities_declare_required_params() {
        for dispatch in Dispatch::ALL {
            let capability = dispatch.capability();
            assert_eq!(capability.namespace, NAMESPACE);
            assert_eq!(capability.required.len(), 1);
        }
    }
}
