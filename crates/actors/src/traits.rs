use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub type Parameters = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry key: the `(namespace, verb)` pair a step names through its
/// `actor` and `action` fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorKey {
    pub namespace: String,
    pub verb: String,
}

impl ActorKey {
    pub fn new(namespace: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            verb: verb.into(),
        }
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.verb)
    }
}

/// What a registered actor can do, as advertised to the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub namespace: String,
    pub verb: String,
    pub description: String,
    /// JSON schema of the accepted parameters.
    pub parameters: Value,
    #[serde(default)]
    pub required: Vec<String>,
}

impl CapabilityDescriptor {
    pub fn new(key: &ActorKey, description: impl Into<String>) -> Self {
        Self {
            namespace: key.namespace.clone(),
            verb: key.verb.clone(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
            required: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, schema: Value, required: &[&str]) -> Self {
        self.parameters = schema;
        self.required = required.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn key(&self) -> ActorKey {
        ActorKey::new(self.namespace.clone(), self.verb.clone())
    }

    /// Checks that every required parameter is present and non-null.
    pub fn check_parameters(&self, parameters: &Parameters) -> Result<(), ActorError> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|name| parameters.get(name.as_str()).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ActorError::InvalidArgument(format!(
                "{}.{} missing required parameters: {}",
                self.namespace,
                self.verb,
                missing.join(", ")
            )))
        }
    }
}

/// A handler for one class of actuation.
///
/// The returned value is opaque to the engine; whether the step worked is
/// decided by validating snapshots afterwards. Only an `Err` counts as an
/// invocation failure.
#[async_trait]
pub trait Actor: Send + Sync {
    async fn execute(&self, parameters: &Parameters) -> Result<Value, ActorError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_actor_key_display() {
        assert_eq!(ActorKey::new("hyprland", "exec").to_string(), "hyprland.exec");
    }

    #[test]
    fn test_check_parameters_reports_all_missing() {
        let descriptor = CapabilityDescriptor::new(&ActorKey::new("ns", "verb"), "test")
            .with_parameters(json!({"type": "object"}), &["a", "b", "c"]);

        let mut params = Parameters::new();
        params.insert("b".to_string(), json!(1));
        params.insert("c".to_string(), Value::Null);

        let err = descriptor.check_parameters(&params).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("a, c"), "{msg}");
    }

    #[test]
    fn test_check_parameters_ok() {
        let descriptor = CapabilityDescriptor::new(&ActorKey::new("ns", "verb"), "test");
        assert!(descriptor.check_parameters(&Parameters::new()).is_ok());
    }
}
