//! Planning oracle backed by a chat model.

use crate::prompt::{extract_json, plan_prompt, recovery_prompt, SYSTEM_PROMPT};
use crate::traits::{ChatProvider, Message};
use async_trait::async_trait;
use deskpilot_actors::CapabilityDescriptor;
use deskpilot_core::{
    parse_plan, OracleError, Plan, PlanDefaults, PlanningOracle, Snapshot, Step, UnmetCriterion,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct LlmPlanningOracle {
    provider: Arc<dyn ChatProvider>,
    defaults: PlanDefaults,
}

impl LlmPlanningOracle {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            defaults: PlanDefaults::default(),
        }
    }

    /// Defaults applied to steps the model leaves partially specified.
    pub fn with_defaults(mut self, defaults: PlanDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    async fn ask(&self, prompt: String) -> Result<Plan, OracleError> {
        let messages = [Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        let reply = self.provider.complete(&messages).await?;
        debug!("{} replied with {} bytes", self.provider.name(), reply.len());

        let raw = extract_json(&reply).ok_or_else(|| {
            warn!("No JSON in planner reply");
            OracleError::Malformed("reply contains no JSON plan".to_string())
        })?;

        parse_plan(&raw, &self.defaults).map_err(|e| OracleError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl PlanningOracle for LlmPlanningOracle {
    async fn plan(
        &self,
        instruction: &str,
        state: &Snapshot,
        available_actions: &[CapabilityDescriptor],
    ) -> Result<Plan, OracleError> {
        self.ask(plan_prompt(instruction, state, available_actions))
            .await
    }

    async fn recover(
        &self,
        step: &Step,
        unmet_criteria: &[UnmetCriterion],
        state: &Snapshot,
    ) -> Result<Plan, OracleError> {
        self.ask(recovery_prompt(step, unmet_criteria, state)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::traits::ProviderError;
    use deskpilot_core::Criterion;
    use parking_lot::Mutex;
    use serde_json::json;

    struct CannedProvider {
        reply: Result<String, String>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl CannedProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(reason.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for CannedProvider {
        async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError> {
            self.seen.lock().push(messages.to_vec());
            self.reply.clone().map_err(ProviderError::Http)
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn test_plan_from_fenced_reply() {
        let provider = CannedProvider::replying(
            "```json\n{\"steps\": [{\"actor\": \"hyprland\", \"action\": \"workspace\", \
             \"parameters\": {\"id\": 2}, \
             \"success_criteria\": {\"extra_fields.active_workspace\": 2}}]}\n```",
        );
        let oracle = LlmPlanningOracle::new(provider.clone());

        let plan = oracle
            .plan("go to workspace 2", &Snapshot::unavailable(), &[])
            .await
            .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].actor, "hyprland");
        assert_eq!(plan.steps[0].parameters["id"], 2);

        let seen = provider.seen.lock();
        assert_eq!(seen[0][0].role, "system");
        assert!(seen[0][1].content.contains("go to workspace 2"));
    }

    #[tokio::test]
    async fn test_defaults_apply_to_parsed_steps() {
        let provider = CannedProvider::replying(
            "[{\"actor\": \"system\", \"action\": \"wait\", \"parameters\": {\"ms\": 10}}]",
        );
        let oracle = LlmPlanningOracle::new(provider).with_defaults(PlanDefaults {
            retry_budget: 7,
            continue_on_error: true,
        });

        let plan = oracle
            .plan("wait", &Snapshot::unavailable(), &[])
            .await
            .unwrap();
        assert_eq!(plan.steps[0].retry_budget, 7);
        assert!(plan.steps[0].continue_on_error);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_malformed() {
        let oracle = LlmPlanningOracle::new(CannedProvider::replying("I cannot help with that"));
        let err = oracle
            .plan("do something", &Snapshot::unavailable(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_invalid_step_is_malformed() {
        let oracle = LlmPlanningOracle::new(CannedProvider::replying(
            "{\"steps\": [{\"actor\": \"\", \"action\": \"wait\"}]}",
        ));
        let err = oracle
            .plan("wait", &Snapshot::unavailable(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_unavailable() {
        let oracle = LlmPlanningOracle::new(CannedProvider::failing("connection refused"));
        let err = oracle
            .plan("wait", &Snapshot::unavailable(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(reason) if reason.contains("refused")));
    }

    #[tokio::test]
    async fn test_recover_sends_unmet_criteria() {
        let provider = CannedProvider::replying("{\"steps\": []}");
        let oracle = LlmPlanningOracle::new(provider.clone());
        let step = Step::new("hyprland", "focus_window")
            .with_criterion("active_application", Criterion::Equals(json!("firefox")));
        let unmet = vec![UnmetCriterion {
            criterion: "active_application".to_string(),
            expected: json!("firefox"),
            actual: Some(json!("kitty")),
        }];

        let plan = oracle
            .recover(&step, &unmet, &Snapshot::unavailable())
            .await
            .unwrap();
        assert!(plan.is_empty());

        let seen = provider.seen.lock();
        assert!(seen[0][1].content.contains("Unmet criteria"));
        assert!(seen[0][1].content.contains("kitty"));
    }
}
