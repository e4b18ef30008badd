use super::{ClientConfig, ModelClient, ModelRequest, ModelResponse, ProviderError, TokenUsage};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Seeded assistant turn that forces a JSON object
const JSON_PREFILL: &str = "{";

/// Anthropic messages client
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    config: ClientConfig,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| ProviderError::MissingApiKey("Anthropic".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Unexpected(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { http, config, api_key })
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/v1/messages", base.trim_end_matches('/'))
    }

    pub(crate) fn build_body(&self, request: &ModelRequest) -> Result<Value, ProviderError> {
        let mut content = vec![json!({"type": "text", "text": request.prompt})];
        if let Some(image) = &request.image_data {
            let (media_type, data) = split_data_url(image)?;
            content.push(json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data},
            }));
        }

        let mut messages = vec![json!({"role": "user", "content": content})];
        if request.json_mode {
            messages.push(json!({"role": "assistant", "content": JSON_PREFILL}));
        }

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });
        if let Some(system) = &request.system_message {
            body["system"] = json!(system);
        }
        Ok(body)
    }

    pub(crate) fn parse_body(body: &Value, json_mode: bool) -> Result<ModelResponse, ProviderError> {
        let text = body["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find(|b| b["type"] == "text"))
            .and_then(|block| block["text"].as_str())
            .ok_or_else(|| ProviderError::Unexpected("response has no text content".to_string()))?;

        // The prefill is not echoed back
        let text = if json_mode && !text.trim_start().starts_with(JSON_PREFILL) {
            format!("{}{}", JSON_PREFILL, text)
        } else {
            text.to_string()
        };

        let usage = body.get("usage").and_then(|usage| {
            let input = usage.get("input_tokens")?.as_u64()?;
            let output = usage.get("output_tokens")?.as_u64()?;
            Some(TokenUsage::new(input, output))
        });
        Ok(ModelResponse { text, usage })
    }
}

/// `data:image/png;base64,AAAA` into (`image/png`, `AAAA`)
fn split_data_url(data_url: &str) -> Result<(&str, &str), ProviderError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| ProviderError::InvalidRequest("image must be a data URL".to_string()))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| ProviderError::InvalidRequest("malformed image data URL".to_string()))?;
    let media_type = meta.strip_suffix(";base64").unwrap_or(meta);
    Ok((media_type, data))
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        log::debug!("sending request to Anthropic model {}", self.config.model);

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_body(request)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown".to_string());
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let body: Value = response.json().await?;
        Self::parse_body(&body, request.json_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::new(ClientConfig {
            model: "claude-3-5-sonnet-20240620".into(),
            api_key: Some("key".into()),
            base_url: None,
            max_tokens: 1000,
            temperature: 0.0,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_default() {
        assert_eq!(client().endpoint(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_json_mode_seeds_assistant_turn() {
        let body = client().build_body(&ModelRequest::new("next?").with_system("sys").json()).unwrap();

        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][1], json!({"role": "assistant", "content": "{"}));
        assert_eq!(body["temperature"], json!(0.0));
    }

    #[test]
    fn test_image_block() {
        let body = client().build_body(&ModelRequest::new("look").with_image("data:image/png;base64,QUJD")).unwrap();

        let image = &body["messages"][0]["content"][1];
        assert_eq!(image["source"]["media_type"], "image/png");
        assert_eq!(image["source"]["data"], "QUJD");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_bad_image_url() {
        let err = client().build_body(&ModelRequest::new("look").with_image("https://x/y.png")).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_prefill_reprepended() {
        let body = json!({
            "content": [{"type": "text", "text": "\"thought\":\"t\"}"}],
            "usage": {"input_tokens": 20, "output_tokens": 4}
        });

        let response = AnthropicClient::parse_body(&body, true).unwrap();
        assert_eq!(response.text, "{\"thought\":\"t\"}");
        assert_eq!(response.usage, Some(TokenUsage::new(20, 4)));

        let plain = AnthropicClient::parse_body(&json!({"content": [{"type": "text", "text": "{\"a\":1}"}]}), true).unwrap();
        assert_eq!(plain.text, "{\"a\":1}");
    }
}
