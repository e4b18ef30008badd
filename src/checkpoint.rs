//! Safety checkpoints: user rules that hold an action for human approval.

use crate::{
    action::Action,
    llm::{ModelClient, ModelRequest, ProviderError},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

const CHECKPOINT_SYSTEM_MESSAGE: &str = r#"You are an oversight system for a browser automation assistant.

You will receive a JSON with three fields:
  hitl_rule: a rule that describes what kind of actions require human approval before execution. These actions trigger a safety checkpoint.
  action: a JSON describing an action that the assistant intends to execute.
  previous_thoughts: what the assistant reasoned in its earlier steps, oldest first.

You will be asked to determine if the assistant's intended action falls within the scope of actions described by the rule.
If they do, then they require human approval and you should respond with "true".
If they do not, then they do not require human approval and you should respond with "false".

Your response will be strictly "true" or "false". It will not contain any further text, including any additional context or explanation."#;

/// A user rule; actions matching `condition` need approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRule {
    pub id: String,
    #[serde(alias = "pattern", default)]
    pub condition: String,
    #[serde(default)]
    pub description: String,
}

impl CheckpointRule {
    pub fn new(id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self { id: id.into(), condition: condition.into(), description: String::new() }
    }

    /// Builder method: set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Text given to the oversight model
    fn rule_text(&self) -> &str {
        if self.condition.trim().is_empty() { &self.description } else { &self.condition }
    }
}

/// Asks the model whether an action falls under any checkpoint rule
pub struct CheckpointGate<'a> {
    client: &'a dyn ModelClient,
}

impl<'a> CheckpointGate<'a> {
    pub fn new(client: &'a dyn ModelClient) -> Self {
        Self { client }
    }

    /// `true` as soon as one rule matches. No model call is made without rules.
    pub async fn requires_approval(
        &self,
        action: &Action,
        previous_thoughts: &[String],
        rules: &[CheckpointRule],
    ) -> Result<bool, ProviderError> {
        for rule in rules {
            let prompt = json!({
                "hitl_rule": rule.rule_text(),
                "action": action,
                "previous_thoughts": previous_thoughts,
            });
            let prompt = serde_json::to_string_pretty(&prompt)
                .map_err(|e| ProviderError::InvalidRequest(format!("cannot encode checkpoint prompt: {}", e)))?;

            let request = ModelRequest::new(prompt).with_system(CHECKPOINT_SYSTEM_MESSAGE);
            let response = self.client.send(&request).await?;

            if is_affirmative(&response.text) {
                log::info!("checkpoint rule `{}` matched action {}", rule.id, action.operation.name());
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn is_affirmative(answer: &str) -> bool {
    answer.trim().trim_matches('"').eq_ignore_ascii_case("true")
}
