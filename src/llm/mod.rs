//! Model clients
//!
//! [`ModelClient`] hides the provider behind one `send` call. The provider for
//! a model id is picked from [`MODEL_PREFIXES`] and built by the matching entry
//! of [`CLIENT_FACTORIES`].

mod anthropic;
mod error;
mod openai;

pub use anthropic::AnthropicClient;
pub use error::ProviderError;
pub use openai::OpenAiClient;

use crate::config::Settings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// One model call
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system_message: Option<String>,
    pub prompt: String,
    /// PNG image as a `data:` URL
    pub image_data: Option<String>,
    /// Ask the provider to answer with a JSON object
    pub json_mode: bool,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Default::default() }
    }

    /// Builder method: set system message
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_message = Some(system.into());
        self
    }

    /// Builder method: attach an image
    pub fn with_image(mut self, data_url: impl Into<String>) -> Self {
        self.image_data = Some(data_url.into());
        self
    }

    /// Builder method: request JSON output
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// A language model provider
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model id requests are sent to
    fn model(&self) -> &str;

    async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "OpenAI"),
            Provider::Anthropic => write!(f, "Anthropic"),
        }
    }
}

/// Model id prefix to provider
pub const MODEL_PREFIXES: &[(&str, Provider)] = &[
    ("claude", Provider::Anthropic),
    ("gpt", Provider::OpenAi),
    ("chatgpt", Provider::OpenAi),
    ("o1", Provider::OpenAi),
    ("o3", Provider::OpenAi),
    ("o4", Provider::OpenAi),
];

/// Everything a client needs to talk to its provider
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

type ClientFactory = fn(ClientConfig) -> Result<Arc<dyn ModelClient>, ProviderError>;

/// Provider to client constructor
pub const CLIENT_FACTORIES: &[(Provider, ClientFactory)] =
    &[(Provider::OpenAi, build_openai), (Provider::Anthropic, build_anthropic)];

fn build_openai(config: ClientConfig) -> Result<Arc<dyn ModelClient>, ProviderError> {
    Ok(Arc::new(OpenAiClient::new(config)?))
}

fn build_anthropic(config: ClientConfig) -> Result<Arc<dyn ModelClient>, ProviderError> {
    Ok(Arc::new(AnthropicClient::new(config)?))
}

/// Provider serving `model`, by id prefix
pub fn provider_for_model(model: &str) -> Option<Provider> {
    let model = model.to_ascii_lowercase();
    MODEL_PREFIXES.iter().find(|(prefix, _)| model.starts_with(prefix)).map(|(_, provider)| *provider)
}

/// Build the client for the model selected in `settings`
pub fn client_from_settings(settings: &Settings, max_tokens: u32) -> Result<Arc<dyn ModelClient>, ProviderError> {
    let model = settings.selected_model.clone();
    let provider = provider_for_model(&model).ok_or_else(|| ProviderError::UnsupportedModel(model.clone()))?;

    let (api_key, base_url) = match provider {
        Provider::OpenAi => (settings.resolved_openai_key(), settings.openai_base_url.clone()),
        Provider::Anthropic => (settings.resolved_anthropic_key(), settings.anthropic_base_url.clone()),
    };
    let config = ClientConfig { model, api_key, base_url, max_tokens, temperature: DEFAULT_TEMPERATURE };

    let factory = CLIENT_FACTORIES
        .iter()
        .find(|(p, _)| *p == provider)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| ProviderError::UnsupportedModel(config.model.clone()))?;

    log::info!("using {} model {}", provider, config.model);
    factory(config)
}
