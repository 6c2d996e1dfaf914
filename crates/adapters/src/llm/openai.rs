//! OpenAI Responses API adapter

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use trendposter_domain::{CompletionError, CompletionProvider};

use super::{LlmConfig, SYSTEM_PROMPT, check_status, http_client, map_send_error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider using the Responses API
pub struct OpenAiProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    config: LlmConfig,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, config: LlmConfig) -> Result<Self, CompletionError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string(), config)
    }

    pub fn with_base_url(
        api_key: SecretString,
        base_url: String,
        config: LlmConfig,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            client: http_client(&config)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
    instructions: &'a str,
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    r#type: String,
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    r#type: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = OpenAiRequest {
            model: &self.config.model,
            input: prompt,
            instructions: SYSTEM_PROMPT,
            temperature: self.config.temperature,
            max_output_tokens: self.config.max_output_tokens,
        };

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let api_response: OpenAiResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CompletionError::InvalidFormat(e.to_string()))?;

        let text = api_response
            .output
            .into_iter()
            .filter(|item| item.r#type == "message")
            .flat_map(|item| item.content)
            .filter(|c| c.r#type == "output_text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(CompletionError::InvalidFormat("Empty response".to_string()));
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::with_base_url(
            SecretString::new("sk-openai".into()),
            server.uri(),
            LlmConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_reads_output_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer sk-openai"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": [
                    {"type": "reasoning", "content": []},
                    {"type": "message", "content": [
                        {"type": "output_text", "text": "{\"matches\":[]}"}
                    ]}
                ]
            })))
            .mount(&server)
            .await;

        let text = provider(&server).complete("score").await.unwrap();
        assert_eq!(text, "{\"matches\":[]}");
    }

    #[tokio::test]
    async fn test_server_error_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        match provider(&server).complete("score").await {
            Err(CompletionError::Api(msg)) => assert!(msg.contains("overloaded")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
