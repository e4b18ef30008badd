use super::{ClientConfig, ModelClient, ModelRequest, ModelResponse, ProviderError, TokenUsage};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI chat completions client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: ClientConfig,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| ProviderError::MissingApiKey("OpenAI".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Unexpected(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { http, config, api_key })
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    pub(crate) fn build_body(&self, request: &ModelRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_message {
            messages.push(json!({"role": "system", "content": system}));
        }

        let user_content = match &request.image_data {
            Some(image) => json!([
                {"type": "text", "text": request.prompt},
                {"type": "image_url", "image_url": {"url": image, "detail": "high"}},
            ]),
            None => json!(request.prompt),
        };
        messages.push(json!({"role": "user", "content": user_content}));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });
        // Vision requests do not combine with JSON mode on every model
        if request.json_mode && request.image_data.is_none() {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    pub(crate) fn parse_body(body: &Value) -> Result<ModelResponse, ProviderError> {
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Unexpected("response has no message content".to_string()))?
            .to_string();

        let usage = body.get("usage").and_then(|usage| {
            let prompt = usage.get("prompt_tokens")?.as_u64()?;
            let completion = usage.get("completion_tokens")?.as_u64()?;
            Some(TokenUsage::new(prompt, completion))
        });
        Ok(ModelResponse { text, usage })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        log::debug!("sending request to OpenAI model {}", self.config.model);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.build_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown".to_string());
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let body: Value = response.json().await?;
        Self::parse_body(&body)
    }
}
