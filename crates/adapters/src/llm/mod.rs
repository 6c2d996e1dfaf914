//! LLM provider adapters
//!
//! Each provider exposes one capability: send a prompt, get text back. The
//! set is closed; [`ProviderKind::resolve`] picks one at startup.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod stub;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use stub::StubProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use trendposter_domain::{CompletionError, CompletionProvider};

/// System instruction shared by every provider
pub(crate) const SYSTEM_PROMPT: &str =
    "You are a social media strategist scoring draft posts against trends. Output only valid JSON.";

/// Common LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// Temperature (0.0-1.0)
    pub temperature: f64,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: ProviderKind::Anthropic.default_model().to_string(),
            temperature: 0.2,
            max_output_tokens: 1024,
            timeout_secs: 45,
        }
    }
}

impl LlmConfig {
    /// Defaults for `kind`, keeping any explicit model override
    pub fn for_provider(kind: ProviderKind, model: Option<&str>) -> Self {
        Self {
            model: model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(kind.default_model())
                .to_string(),
            ..Default::default()
        }
    }
}

/// Supported completion providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Gemini,
    Ollama,
    /// Offline keyword scorer; never auto-detected
    Stub,
}

impl ProviderKind {
    /// Auto-detection order
    pub const PRIORITY: [ProviderKind; 4] = [
        ProviderKind::Anthropic,
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Stub => "stub",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-sonnet-4-5-20250929",
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::Ollama => "llama3.2",
            ProviderKind::Stub => "stub",
        }
    }

    /// Environment variable holding this provider's credential, if it needs one
    pub fn credential_var(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::Ollama => None,
            ProviderKind::Stub => None,
        }
    }

    /// Pick the provider: the explicit override if given, else the first
    /// configured provider in [`ProviderKind::PRIORITY`]. An override that
    /// needs a credential must have one.
    pub fn resolve(
        forced: Option<ProviderKind>,
        is_configured: impl Fn(ProviderKind) -> bool,
    ) -> Result<ProviderKind, ProviderSelectionError> {
        if let Some(kind) = forced {
            if kind.credential_var().is_none() || is_configured(kind) {
                return Ok(kind);
            }
            return Err(ProviderSelectionError::NotConfigured(kind));
        }

        Self::PRIORITY
            .into_iter()
            .find(|kind| is_configured(*kind))
            .ok_or(ProviderSelectionError::NoneConfigured)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderSelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            "stub" => Ok(ProviderKind::Stub),
            other => Err(ProviderSelectionError::Unknown(other.to_string())),
        }
    }
}

/// Provider selection failures; fatal at startup
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProviderSelectionError {
    #[error("unknown LLM provider '{0}' (expected anthropic, openai, gemini, ollama or stub)")]
    Unknown(String),
    #[error("LLM_PROVIDER={0} but its API key is not set")]
    NotConfigured(ProviderKind),
    #[error(
        "no LLM provider configured; set one of ANTHROPIC_API_KEY, OPENAI_API_KEY, GEMINI_API_KEY or OLLAMA_BASE_URL"
    )]
    NoneConfigured,
}

/// The selected provider
pub enum LlmProvider {
    Anthropic(AnthropicProvider),
    OpenAi(OpenAiProvider),
    Gemini(GeminiProvider),
    Ollama(OllamaProvider),
    Stub(StubProvider),
}

impl LlmProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            LlmProvider::Anthropic(_) => ProviderKind::Anthropic,
            LlmProvider::OpenAi(_) => ProviderKind::OpenAi,
            LlmProvider::Gemini(_) => ProviderKind::Gemini,
            LlmProvider::Ollama(_) => ProviderKind::Ollama,
            LlmProvider::Stub(_) => ProviderKind::Stub,
        }
    }
}

#[async_trait]
impl CompletionProvider for LlmProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        match self {
            LlmProvider::Anthropic(p) => p.complete(prompt).await,
            LlmProvider::OpenAi(p) => p.complete(prompt).await,
            LlmProvider::Gemini(p) => p.complete(prompt).await,
            LlmProvider::Ollama(p) => p.complete(prompt).await,
            LlmProvider::Stub(p) => p.complete(prompt).await,
        }
    }

    fn name(&self) -> &str {
        self.kind().as_str()
    }
}

/// Build the shared HTTP client
pub(crate) fn http_client(config: &LlmConfig) -> Result<reqwest::Client, CompletionError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CompletionError::Config(format!("Failed to build HTTP client: {}", e)))
}

pub(crate) fn map_send_error(e: reqwest::Error) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout
    } else {
        CompletionError::Api(e.to_string())
    }
}

/// Map non-success statuses to errors
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, CompletionError> {
    if response.status() == 429 {
        return Err(CompletionError::RateLimited);
    }

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(CompletionError::Api(format!(
            "API returned {}: {}",
            status, body
        )));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_follows_priority() {
        let configured = |k: ProviderKind| matches!(k, ProviderKind::Gemini | ProviderKind::Ollama);
        assert_eq!(
            ProviderKind::resolve(None, configured),
            Ok(ProviderKind::Gemini)
        );
    }

    #[test]
    fn test_resolve_honors_override() {
        let configured = |_: ProviderKind| true;
        assert_eq!(
            ProviderKind::resolve(Some(ProviderKind::Ollama), configured),
            Ok(ProviderKind::Ollama)
        );
    }

    #[test]
    fn test_resolve_override_must_be_configured() {
        let configured = |k: ProviderKind| k == ProviderKind::Anthropic;
        assert_eq!(
            ProviderKind::resolve(Some(ProviderKind::OpenAi), configured),
            Err(ProviderSelectionError::NotConfigured(ProviderKind::OpenAi))
        );
    }

    #[test]
    fn test_forced_ollama_needs_no_key() {
        assert_eq!(
            ProviderKind::resolve(Some(ProviderKind::Ollama), |_| false),
            Ok(ProviderKind::Ollama)
        );
    }

    #[test]
    fn test_resolve_none_configured() {
        assert_eq!(
            ProviderKind::resolve(None, |_| false),
            Err(ProviderSelectionError::NoneConfigured)
        );
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert!("mistral".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_config_for_provider_uses_default_model() {
        assert_eq!(
            LlmConfig::for_provider(ProviderKind::Ollama, None).model,
            "llama3.2"
        );
        assert_eq!(
            LlmConfig::for_provider(ProviderKind::OpenAi, Some("gpt-4o-mini")).model,
            "gpt-4o-mini"
        );
    }
}
