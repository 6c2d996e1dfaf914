//! Anthropic Claude API adapter

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use trendposter_domain::{CompletionError, CompletionProvider};

use super::{LlmConfig, SYSTEM_PROMPT, check_status, http_client, map_send_error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic messages API provider
pub struct AnthropicProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    config: LlmConfig,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, config: LlmConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            client: http_client(&config)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            config,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    system: &'a str,
    temperature: f64,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    r#type: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_output_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            system: SYSTEM_PROMPT,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let api_response: AnthropicResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CompletionError::InvalidFormat(e.to_string()))?;

        let text = api_response
            .content
            .into_iter()
            .filter(|c| c.r#type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(CompletionError::InvalidFormat("Empty response".to_string()));
        }

        tracing::debug!(model = %self.config.model, chars = text.len(), "Anthropic completion");
        Ok(text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> AnthropicProvider {
        AnthropicProvider::new(SecretString::new("sk-test".into()), LlmConfig::default())
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_complete_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "{\"matches\":"},
                    {"type": "text", "text": "[]}"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server).complete("score these").await.unwrap();
        assert_eq!(text, "{\"matches\":[]}");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server).complete("x").await.unwrap_err();
        assert!(matches!(err, CompletionError::RateLimited));
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})),
            )
            .mount(&server)
            .await;

        let err = provider(&server).complete("x").await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidFormat(_)));
    }
}
