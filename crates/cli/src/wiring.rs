//! Builds adapters and domain services from configuration

use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trendposter_adapters::{
    llm::{
        AnthropicProvider, GeminiProvider, LlmConfig, LlmProvider, OllamaProvider,
        OpenAiProvider, ProviderKind, StubProvider, ollama,
    },
    queue::SqliteQueueStore,
    trends::{ScrapingTrendSource, TrendScraperConfig},
    x::XPublisher,
};
use trendposter_domain::{
    PLATFORM_MAX_CHARS, QueueLimits,
    usecases::{OrchestratorConfig, StatusInfo},
};

use crate::config::AppConfig;

/// Open the SQLite queue at the configured path
pub async fn open_queue(config: &AppConfig) -> Result<SqliteQueueStore> {
    let limits = QueueLimits {
        max_chars: PLATFORM_MAX_CHARS,
        max_queued: config.queue.max_queue_size,
    };
    SqliteQueueStore::new(&config.general.database_path, limits)
        .await
        .with_context(|| {
            format!(
                "Failed to open queue database: {}",
                config.general.database_path.display()
            )
        })
}

/// Which provider `build_provider` would pick, without building it
pub fn resolve_provider(
    config: &AppConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ProviderKind> {
    let forced = match config.llm.provider.trim() {
        "" => None,
        name => Some(ProviderKind::from_str(name)?),
    };

    let kind = ProviderKind::resolve(forced, |kind| match kind {
        ProviderKind::Ollama => !config.llm.ollama_base_url.trim().is_empty(),
        ProviderKind::Stub => false,
        other => other
            .credential_var()
            .and_then(&env)
            .is_some_and(|v| !v.trim().is_empty()),
    })?;

    Ok(kind)
}

/// Select and construct the completion provider
pub fn build_provider(
    config: &AppConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<LlmProvider> {
    let kind = resolve_provider(config, &env)?;
    let llm_config = llm_config_for(config, kind);

    tracing::info!(provider = %kind, model = %llm_config.model, "Selected LLM provider");

    let provider = match kind {
        ProviderKind::Anthropic => LlmProvider::Anthropic(AnthropicProvider::new(
            credential(kind, &env)?,
            llm_config,
        )?),
        ProviderKind::OpenAi => {
            LlmProvider::OpenAi(OpenAiProvider::new(credential(kind, &env)?, llm_config)?)
        }
        ProviderKind::Gemini => {
            LlmProvider::Gemini(GeminiProvider::new(credential(kind, &env)?, llm_config)?)
        }
        ProviderKind::Ollama => {
            let base_url = match config.llm.ollama_base_url.trim() {
                "" => ollama::DEFAULT_BASE_URL,
                url => url,
            };
            LlmProvider::Ollama(OllamaProvider::new(base_url, llm_config)?)
        }
        ProviderKind::Stub => LlmProvider::Stub(StubProvider::keywords()),
    };

    Ok(provider)
}

fn llm_config_for(config: &AppConfig, kind: ProviderKind) -> LlmConfig {
    let model = match kind {
        ProviderKind::Ollama if !config.llm.ollama_model.trim().is_empty() => {
            config.llm.ollama_model.as_str()
        }
        _ => config.llm.model.as_str(),
    };

    LlmConfig {
        temperature: config.llm.temperature,
        max_output_tokens: config.llm.max_output_tokens,
        timeout_secs: config.llm.timeout_secs,
        ..LlmConfig::for_provider(kind, Some(model))
    }
}

fn credential(kind: ProviderKind, env: impl Fn(&str) -> Option<String>) -> Result<SecretString> {
    let var = kind
        .credential_var()
        .with_context(|| format!("Provider {} takes no API key", kind))?;
    match env(var) {
        Some(key) if !key.trim().is_empty() => Ok(SecretString::new(key.trim().into())),
        _ => bail!("Missing API key env var {} for provider {}", var, kind),
    }
}

/// Read a token from the environment variable named by `env_var`
pub fn load_token(env_var: &str, purpose: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No token env var configured for {}", purpose);
    }

    let token = std::env::var(env_var)
        .with_context(|| format!("Missing token env var {} for {}", env_var, purpose))?;

    if token.trim().is_empty() {
        bail!("Token env var {} is empty for {}", env_var, purpose);
    }

    Ok(SecretString::new(token.trim().into()))
}

fn trend_scraper_config(config: &AppConfig) -> TrendScraperConfig {
    TrendScraperConfig {
        region: config.trends.region.clone(),
        max_entries: config.trends.max_entries,
        timeout_secs: config.trends.timeout_secs,
        ..Default::default()
    }
}

pub fn build_trend_source(config: &AppConfig) -> Result<ScrapingTrendSource> {
    ScrapingTrendSource::new(trend_scraper_config(config))
        .context("Failed to build trend scraper")
}

pub fn build_publisher(config: &AppConfig) -> Result<XPublisher> {
    let token = load_token(&config.x.user_token_env, "X publishing")?;
    XPublisher::new(token, Duration::from_secs(config.x.timeout_secs))
        .context("Failed to build X publisher")
}

/// Slack on top of the adapters' own timeouts, so they fire first
const CEILING_MARGIN: Duration = Duration::from_secs(5);

/// LLM calls one matcher run may make: the first plus one reformat retry
const MATCHER_CALLS: u32 = 2;

/// Orchestrator settings, with per-call ceilings derived from the adapter
/// timeouts they wrap
pub fn orchestrator_config(config: &AppConfig) -> Result<OrchestratorConfig> {
    let llm_call = Duration::from_secs(config.llm.timeout_secs);
    Ok(OrchestratorConfig {
        window: config.posting_window()?,
        min_relevance_score: config.schedule.min_relevance_score,
        scrape_timeout: trend_scraper_config(config).fetch_budget() + CEILING_MARGIN,
        match_timeout: llm_call.saturating_mul(MATCHER_CALLS) + CEILING_MARGIN,
        publish_timeout: Duration::from_secs(config.x.timeout_secs) + CEILING_MARGIN,
        ..Default::default()
    })
}

pub fn status_info(config: &AppConfig, provider: ProviderKind) -> Result<StatusInfo> {
    let window = config.posting_window()?;
    Ok(StatusInfo {
        provider: provider.to_string(),
        check_interval_minutes: config.schedule.check_interval_minutes,
        posting_window: format!(
            "{:02}:00-{:02}:00 {}",
            window.start_hour(),
            window.end_hour(),
            window.timezone()
        ),
        min_relevance_score: config.schedule.min_relevance_score,
        auto_post: config.schedule.auto_post,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use trendposter_domain::CompletionProvider;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_resolve_uses_priority_order() {
        let config = AppConfig::default();
        let kind = resolve_provider(
            &config,
            env_of(&[("GEMINI_API_KEY", "g"), ("OPENAI_API_KEY", "o")]),
        )
        .unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
    }

    #[test]
    fn test_resolve_ignores_blank_keys() {
        let config = AppConfig::default();
        let kind = resolve_provider(
            &config,
            env_of(&[("ANTHROPIC_API_KEY", "  "), ("GEMINI_API_KEY", "g")]),
        )
        .unwrap();
        assert_eq!(kind, ProviderKind::Gemini);
    }

    #[test]
    fn test_resolve_ollama_from_base_url() {
        let mut config = AppConfig::default();
        config.llm.ollama_base_url = "http://ollama:11434".to_string();
        assert_eq!(
            resolve_provider(&config, env_of(&[])).unwrap(),
            ProviderKind::Ollama
        );
    }

    #[test]
    fn test_resolve_rejects_unknown_and_unconfigured() {
        let mut config = AppConfig::default();
        assert!(resolve_provider(&config, env_of(&[])).is_err());

        config.llm.provider = "mystery".to_string();
        assert!(resolve_provider(&config, env_of(&[])).is_err());

        config.llm.provider = "anthropic".to_string();
        assert!(resolve_provider(&config, env_of(&[])).is_err());
    }

    #[tokio::test]
    async fn test_build_stub_provider() {
        let mut config = AppConfig::default();
        config.llm.provider = "stub".to_string();
        let provider = build_provider(&config, env_of(&[])).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Stub);
        assert_eq!(provider.name(), "stub");
    }

    #[test]
    fn test_ollama_model_override() {
        let mut config = AppConfig::default();
        config.llm.model = "general".to_string();
        config.llm.ollama_model = "mistral".to_string();
        assert_eq!(llm_config_for(&config, ProviderKind::Ollama).model, "mistral");
        assert_eq!(llm_config_for(&config, ProviderKind::OpenAi).model, "general");

        config.llm.model.clear();
        assert_eq!(llm_config_for(&config, ProviderKind::Gemini).model, "gemini-2.0-flash");
    }

    #[test]
    fn test_orchestrator_ceilings_follow_adapter_timeouts() {
        let mut config = AppConfig::default();
        config.trends.timeout_secs = 20;
        config.llm.timeout_secs = 60;
        config.x.timeout_secs = 10;
        config.schedule.min_relevance_score = 70;

        let orchestrator = orchestrator_config(&config).unwrap();

        // Two trend pages, each allowed its full timeout
        assert_eq!(orchestrator.scrape_timeout, Duration::from_secs(45));
        assert_eq!(orchestrator.match_timeout, Duration::from_secs(125));
        assert_eq!(orchestrator.publish_timeout, Duration::from_secs(15));
        assert_eq!(orchestrator.min_relevance_score, 70);
    }

    #[test]
    fn test_default_ceilings_outlast_adapter_timeouts() {
        let config = AppConfig::default();
        let orchestrator = orchestrator_config(&config).unwrap();
        let per_page = Duration::from_secs(config.trends.timeout_secs);
        let llm_call = Duration::from_secs(config.llm.timeout_secs);

        assert!(orchestrator.scrape_timeout > per_page * 2);
        assert!(orchestrator.match_timeout > llm_call * 2);
        assert!(orchestrator.publish_timeout > Duration::from_secs(config.x.timeout_secs));
    }

    #[test]
    fn test_status_info_formats_window() {
        let config = AppConfig::default();
        let info = status_info(&config, ProviderKind::Anthropic).unwrap();
        assert_eq!(info.posting_window, "08:00-22:00 UTC");
        assert_eq!(info.provider, "anthropic");
    }
}
