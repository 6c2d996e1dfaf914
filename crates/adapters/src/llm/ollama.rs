//! Ollama local LLM adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use trendposter_domain::{CompletionError, CompletionProvider};

use super::{LlmConfig, SYSTEM_PROMPT, check_status, http_client, map_send_error};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama provider for local models
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    config: LlmConfig,
}

impl OllamaProvider {
    pub fn new(base_url: &str, config: LlmConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            client: http_client(&config)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: i32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
            system: SYSTEM_PROMPT,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: i32::try_from(self.config.max_output_tokens).unwrap_or(i32::MAX),
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let api_response: OllamaResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CompletionError::InvalidFormat(e.to_string()))?;

        if api_response.response.is_empty() {
            return Err(CompletionError::InvalidFormat("Empty response".to_string()));
        }

        Ok(api_response.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_complete_disables_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(
                serde_json::json!({"model": "llama3.2", "stream": false}),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "{\"matches\":[]}"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = LlmConfig::for_provider(super::super::ProviderKind::Ollama, None);
        let provider = OllamaProvider::new(&format!("{}/", server.uri()), config).unwrap();
        assert_eq!(provider.complete("p").await.unwrap(), "{\"matches\":[]}");
    }
}
