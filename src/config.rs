//! Agent configuration
//!
//! Two layers are kept apart:
//! - [`Settings`]: the persisted, user-edited document (model choice, API keys,
//!   checkpoint rules, custom knowledge). Stored as flat camelCase JSON.
//! - [`AgentConfig`]: timings and limits of the task loop. Not persisted; built
//!   from defaults and overridden by the embedding binary.

use crate::{
    checkpoint::CheckpointRule,
    error::{AgentError, Result},
    knowledge::HostKnowledgeBase,
};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";

/// How the page is presented to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Side-by-side clean and annotated screenshot plus label metadata
    #[default]
    Vision,
    /// Simplified DOM text only
    Text,
}

impl std::str::FromStr for AgentMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vision" => Ok(AgentMode::Vision),
            "text" | "dom" => Ok(AgentMode::Text),
            other => Err(AgentError::Config(format!("unknown agent mode `{}`", other))),
        }
    }
}

/// The persisted settings document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub selected_model: String,

    #[serde(rename = "openAIKey", skip_serializing_if = "Option::is_none")]
    pub openai_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_key: Option<String>,

    #[serde(rename = "openAIBaseUrl", skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_base_url: Option<String>,

    pub agent_mode: AgentMode,

    pub hitl_rules: Vec<CheckpointRule>,

    pub custom_knowledge_base: HostKnowledgeBase,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_model: DEFAULT_MODEL.to_string(),
            openai_key: None,
            anthropic_key: None,
            openai_base_url: None,
            anthropic_base_url: None,
            agent_mode: AgentMode::default(),
            hitl_rules: Vec::new(),
            custom_knowledge_base: HostKnowledgeBase::default(),
        }
    }
}

impl Settings {
    /// Parse a settings document from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AgentError::Config(format!("invalid settings document: {}", e)))
    }

    /// Load a settings document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Write the settings document to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// OpenAI key from the document, falling back to the environment
    pub fn resolved_openai_key(&self) -> Option<String> {
        non_empty(self.openai_key.clone()).or_else(|| non_empty(std::env::var(OPENAI_KEY_ENV).ok()))
    }

    /// Anthropic key from the document, falling back to the environment
    pub fn resolved_anthropic_key(&self) -> Option<String> {
        non_empty(self.anthropic_key.clone()).or_else(|| non_empty(std::env::var(ANTHROPIC_KEY_ENV).ok()))
    }

    /// Builder method: set the model id
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.selected_model = model.into();
        self
    }

    /// Builder method: set the agent mode
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.agent_mode = mode;
        self
    }

    /// Builder method: add a checkpoint rule
    pub fn with_rule(mut self, rule: CheckpointRule) -> Self {
        self.hitl_rules.push(rule);
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Timings and limits of the task loop
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Hard cap on executed iterations; reaching it ends the task as a success
    pub max_iterations: usize,

    /// Model query attempts per iteration
    pub max_attempts: usize,

    pub inter_iteration_delay: Duration,
    pub mouse_press_gap: Duration,
    pub click_settle: Duration,
    pub keystroke_delay: Duration,
    pub select_all_settle: Duration,
    pub scroll_settle: Duration,
    pub wait_duration: Duration,
    pub annotation_settle: Duration,

    pub stability_interval: Duration,
    pub stability_timeout: Duration,
    pub stability_checks: usize,

    pub max_tokens: u32,

    /// TrueType font for screenshot captions; captions are skipped without one
    pub caption_font: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_attempts: 3,
            inter_iteration_delay: Duration::from_secs(2),
            mouse_press_gap: Duration::from_millis(20),
            click_settle: Duration::from_millis(500),
            keystroke_delay: Duration::from_millis(10),
            select_all_settle: Duration::from_millis(200),
            scroll_settle: Duration::from_millis(300),
            wait_duration: Duration::from_secs(3),
            annotation_settle: Duration::from_millis(300),
            stability_interval: Duration::from_millis(500),
            stability_timeout: Duration::from_secs(10),
            stability_checks: 3,
            max_tokens: 1000,
            caption_font: None,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// All delays set to zero; used by tests and dry runs
    pub fn instant() -> Self {
        Self {
            inter_iteration_delay: Duration::ZERO,
            mouse_press_gap: Duration::ZERO,
            click_settle: Duration::ZERO,
            keystroke_delay: Duration::ZERO,
            select_all_settle: Duration::ZERO,
            scroll_settle: Duration::ZERO,
            wait_duration: Duration::ZERO,
            annotation_settle: Duration::ZERO,
            stability_interval: Duration::ZERO,
            stability_timeout: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Builder method: set the iteration cap
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Builder method: set model query attempts per iteration
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder method: set the delay between iterations
    pub fn inter_iteration_delay(mut self, delay: Duration) -> Self {
        self.inter_iteration_delay = delay;
        self
    }

    /// Builder method: set the caption font
    pub fn caption_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.caption_font = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_when_fields_missing() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings.selected_model, DEFAULT_MODEL);
        assert_eq!(settings.agent_mode, AgentMode::Vision);
        assert!(settings.hitl_rules.is_empty());
    }

    #[test]
    fn test_settings_camel_case_keys() {
        let json = r#"{
            "selectedModel": "gpt-4o",
            "openAIKey": "sk-test",
            "agentMode": "text",
            "hitlRules": [{"id": "r1", "condition": "submits a payment", "description": "payments"}]
        }"#;

        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.selected_model, "gpt-4o");
        assert_eq!(settings.openai_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.agent_mode, AgentMode::Text);
        assert_eq!(settings.hitl_rules.len(), 1);
        assert_eq!(settings.resolved_openai_key().as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_settings_invalid_document() {
        let err = Settings::from_json("{\"agentMode\": \"telepathy\"}").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_agent_mode_from_str() {
        assert_eq!("VISION".parse::<AgentMode>().unwrap(), AgentMode::Vision);
        assert_eq!("dom".parse::<AgentMode>().unwrap(), AgentMode::Text);
        assert!("audio".parse::<AgentMode>().is_err());
    }

    #[test]
    fn test_agent_config_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.inter_iteration_delay, Duration::from_secs(2));
        assert_eq!(config.stability_checks, 3);
    }

    #[test]
    fn test_agent_config_builder() {
        let config = AgentConfig::instant().max_iterations(4).max_attempts(0);
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.click_settle, Duration::ZERO);
    }
}
