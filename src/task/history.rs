use crate::{
    action::{Action, ParseError},
    llm::TokenUsage,
};
use serde::{Deserialize, Serialize};

/// What came out of one model query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Outcome {
    Action(Action),
    /// The response could not be parsed, even after retries
    ParseError(ParseError),
    /// A human turned the action down at a checkpoint; it was never executed
    Rejected(Action),
    /// Executed, but its label matched nothing on the page
    TargetNotFound(Action),
}

impl Outcome {
    pub fn action(&self) -> Option<&Action> {
        match self {
            Outcome::Action(action) | Outcome::Rejected(action) | Outcome::TargetNotFound(action) => Some(action),
            Outcome::ParseError(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub prompt: String,
    pub raw_response: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl HistoryEntry {
    pub fn new(prompt: impl Into<String>, raw_response: impl Into<String>, outcome: Outcome) -> Self {
        Self { prompt: prompt.into(), raw_response: raw_response.into(), outcome, usage: None }
    }

    /// Builder method: set token usage
    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    /// Rendering used in the "previous actions" part of the prompt
    pub fn describe(&self) -> String {
        match &self.outcome {
            Outcome::Action(action) => action.to_string(),
            Outcome::ParseError(e) => format!("Invalid response: {}", e),
            Outcome::Rejected(action) => {
                format!("{}\nThe user rejected this action, it was not performed. Choose a different next step.", action)
            }
            Outcome::TargetNotFound(action) => {
                format!("{}\nNo element on the page matched that label, nothing happened. Pick a label from the current page.", action)
            }
        }
    }
}

/// Thoughts of every entry that carried an action, oldest first
pub fn previous_thoughts(history: &[HistoryEntry]) -> Vec<String> {
    history.iter().filter_map(|e| e.outcome.action()).map(|a| a.thought.clone()).collect()
}
