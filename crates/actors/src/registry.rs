use crate::traits::{Actor, ActorKey, CapabilityDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Actor already registered with a different handler: {0}")]
    DuplicateActor(ActorKey),
    #[error("Actor not found: {0}")]
    ActorNotFound(ActorKey),
}

#[derive(Clone)]
struct Registration {
    handler: Arc<dyn Actor>,
    capability: CapabilityDescriptor,
}

/// Maps `(namespace, verb)` to a handler.
///
/// Registration takes `&mut self`, so once the registry is shared behind an
/// `Arc` it is read-only and lookups are safe across concurrent runs.
pub struct ActorRegistry {
    actors: HashMap<ActorKey, Registration>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self {
            actors: HashMap::new(),
        }
    }

    /// Registers a handler. Re-registering the same handler is a no-op;
    /// a different handler under an existing key is rejected unless
    /// `allow_override` is set.
    pub fn register(
        &mut self,
        key: ActorKey,
        handler: Arc<dyn Actor>,
        capability: CapabilityDescriptor,
        allow_override: bool,
    ) -> Result<&mut Self, RegistryError> {
        if let Some(existing) = self.actors.get(&key) {
            if Arc::ptr_eq(&existing.handler, &handler) {
                tracing::debug!("Actor {} already registered", key);
                return Ok(self);
            }
            if !allow_override {
                return Err(RegistryError::DuplicateActor(key));
            }
            tracing::info!("Overriding actor {}", key);
        }

        self.actors.insert(key, Registration { handler, capability });
        Ok(self)
    }

    pub fn resolve(&self, namespace: &str, verb: &str) -> Result<Arc<dyn Actor>, RegistryError> {
        let key = ActorKey::new(namespace, verb);
        self.actors
            .get(&key)
            .map(|r| r.handler.clone())
            .ok_or(RegistryError::ActorNotFound(key))
    }

    pub fn capability(&self, namespace: &str, verb: &str) -> Option<&CapabilityDescriptor> {
        self.actors
            .get(&ActorKey::new(namespace, verb))
            .map(|r| &r.capability)
    }

    /// All descriptors, sorted by key so planner prompts are stable.
    pub fn capabilities(&self) -> Vec<CapabilityDescriptor> {
        let mut keys: Vec<&ActorKey> = self.actors.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|k| self.actors.get(k))
            .map(|r| r.capability.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.actors.len()
    }
}

impl Default for ActorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::traits::{ActorError, Parameters};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Fixed(&'static str);

    #[async_trait]
    impl Actor for Fixed {
        async fn execute(&self, _parameters: &Parameters) -> Result<Value, ActorError> {
            Ok(json!(self.0))
        }
    }

    fn descriptor(ns: &str, verb: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(&ActorKey::new(ns, verb), "test actor")
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let mut registry = ActorRegistry::new();
        registry
            .register(
                ActorKey::new("generic", "click"),
                Arc::new(Fixed("clicked")),
                descriptor("generic", "click"),
                false,
            )
            .unwrap();

        let actor = registry.resolve("generic", "click").unwrap();
        let out = actor.execute(&Parameters::new()).await.unwrap();
        assert_eq!(out, json!("clicked"));
    }

    #[test]
    fn test_resolve_missing() {
        let registry = ActorRegistry::new();
        let err = registry.resolve("chrome", "open_url").err().unwrap();
        assert_eq!(err, RegistryError::ActorNotFound(ActorKey::new("chrome", "open_url")));
    }

    #[test]
    fn test_same_handler_is_idempotent() {
        let mut registry = ActorRegistry::new();
        let handler: Arc<dyn Actor> = Arc::new(Fixed("a"));
        let key = ActorKey::new("ns", "verb");

        registry
            .register(key.clone(), handler.clone(), descriptor("ns", "verb"), false)
            .unwrap();
        registry
            .register(key, handler, descriptor("ns", "verb"), false)
            .unwrap();

        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_duplicate_rejected_without_override() {
        let mut registry = ActorRegistry::new();
        let key = ActorKey::new("ns", "verb");

        registry
            .register(key.clone(), Arc::new(Fixed("a")), descriptor("ns", "verb"), false)
            .unwrap();
        let err = registry
            .register(key.clone(), Arc::new(Fixed("b")), descriptor("ns", "verb"), false)
            .err()
            .unwrap();

        assert_eq!(err, RegistryError::DuplicateActor(key));
    }

    #[tokio::test]
    async fn test_override_replaces_handler() {
        let mut registry = ActorRegistry::new();
        let key = ActorKey::new("ns", "verb");

        registry
            .register(key.clone(), Arc::new(Fixed("a")), descriptor("ns", "verb"), false)
            .unwrap();
        registry
            .register(key, Arc::new(Fixed("b")), descriptor("ns", "verb"), true)
            .unwrap();

        let out = registry
            .resolve("ns", "verb")
            .unwrap()
            .execute(&Parameters::new())
            .await
            .unwrap();
        assert_eq!(out, json!("b"));
    }

    #[test]
    fn test_capabilities_sorted() {
        let mut registry = ActorRegistry::new();
        for (ns, verb) in [("system", "wait"), ("hyprland", "exec"), ("hyprland", "close_window")] {
            registry
                .register(
                    ActorKey::new(ns, verb),
                    Arc::new(Fixed("x")),
                    descriptor(ns, verb),
                    false,
                )
                .unwrap();
        }

        let keys: Vec<String> = registry
            .capabilities()
            .iter()
            .map(|c| c.key().to_string())
            .collect();
        assert_eq!(keys, vec!["hyprland.close_window", "hyprland.exec", "system.wait"]);
    }
}
