use crate::traits::{Actor, ActorError, ActorKey, CapabilityDescriptor, Parameters};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;

pub const NAMESPACE: &str = "system";

/// Upper bound for a single `system.wait`.
const MAX_WAIT_MS: u64 = 60_000;

pub struct WaitActor;

impl WaitActor {
    pub fn key() -> ActorKey {
        ActorKey::new(NAMESPACE, "wait")
    }

    pub fn capability() -> CapabilityDescriptor {
        CapabilityDescriptor::new(&Self::key(), "Pause to let the desktop settle").with_parameters(
            json!({
                "type": "object",
                "properties": {
                    "duration_ms": { "type": "integer", "description": "Milliseconds to wait (max 60000)" }
                },
                "required": ["duration_ms"]
            }),
            &["duration_ms"],
        )
    }
}

#[async_trait]
impl Actor for WaitActor {
    async fn execute(&self, parameters: &Parameters) -> Result<Value, ActorError> {
        let duration_ms = parameters
            .get("duration_ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| ActorError::InvalidArgument("Missing 'duration_ms' field".to_string()))?;

        if duration_ms > MAX_WAIT_MS {
            return Err(ActorError::InvalidArgument(format!(
                "duration_ms exceeds {}",
                MAX_WAIT_MS
            )));
        }

        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        Ok(json!({ "waited_ms": duration_ms }))
    }
}

/// Launches a program detached from the agent. Used outside a compositor
/// where `hyprland.exec` is unavailable.
pub struct ExecActor;

impl ExecActor {
    pub fn key() -> ActorKey {
        ActorKey::new(NAMESPACE, "exec")
    }

    pub fn capability() -> CapabilityDescriptor {
        CapabilityDescriptor::new(&Self::key(), "Launch a program in the background").with_parameters(
            json!({
                "type": "object",
                "properties": {
                    "program": { "type": "string" },
                    "args": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["program"]
            }),
            &["program"],
        )
    }
}

#[async_trait]
impl Actor for ExecActor {
    async fn execute(&self, parameters: &Parameters) -> Result<Value, ActorError> {
        let program = parameters
            .get("program")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ActorError::InvalidArgument("Missing 'program' field".to_string()))?;

        let args: Vec<String> = match parameters.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ActorError::InvalidArgument("'args' must be an array of strings".to_string())
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(ActorError::InvalidArgument(
                    "'args' must be an array of strings".to_string(),
                ))
            }
        };

        let child = tokio::process::Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(json!({ "program": program, "pid": child.id() }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_wait_short() {
        let out = WaitActor.execute(&params(json!({"duration_ms": 5}))).await.unwrap();
        assert_eq!(out["waited_ms"], 5);
    }

    #[tokio::test]
    async fn test_wait_rejects_long_duration() {
        let err = WaitActor
            .execute(&params(json!({"duration_ms": 3_600_000})))
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_exec_rejects_non_string_args() {
        let err = ExecActor
            .execute(&params(json!({"program": "true", "args": [1, 2]})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("array of strings"));
    }

    #[tokio::test]
    async fn test_exec_missing_program_is_io_error() {
        let err = ExecActor
            .execute(&params(json!({"program": "/nonexistent/deskpilot-test-binary"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::Io(_)));
    }
}
