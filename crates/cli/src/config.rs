//! Configuration loading and management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use trendposter_domain::policy::PostingWindow;

const DEFAULT_CONFIG_PATH: &str = "./trendposter.toml";

/// Flat environment keys and the config paths they override
const FLAT_ENV_KEYS: &[(&str, &str)] = &[
    ("CHECK_INTERVAL_MINUTES", "schedule.check_interval_minutes"),
    ("POSTING_HOURS_START", "schedule.posting_hours_start"),
    ("POSTING_HOURS_END", "schedule.posting_hours_end"),
    ("MIN_RELEVANCE_SCORE", "schedule.min_relevance_score"),
    ("TIMEZONE", "schedule.timezone"),
    ("AUTO_POST", "schedule.auto_post"),
    ("LLM_PROVIDER", "llm.provider"),
    ("LLM_MODEL", "llm.model"),
    ("OLLAMA_BASE_URL", "llm.ollama_base_url"),
    ("OLLAMA_MODEL", "llm.ollama_model"),
    ("DATABASE_PATH", "general.database_path"),
    ("MAX_QUEUE_SIZE", "queue.max_queue_size"),
    ("TELEGRAM_CHAT_ID", "bots.telegram_chat_id"),
    ("DISCORD_CHANNEL_ID", "bots.discord_channel_id"),
];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub trends: TrendsConfig,

    #[serde(default)]
    pub x: XConfig,

    #[serde(default)]
    pub bots: BotsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u64,

    #[serde(default = "default_hours_start")]
    pub posting_hours_start: u8,

    #[serde(default = "default_hours_end")]
    pub posting_hours_end: u8,

    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: u8,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_true")]
    pub auto_post: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Empty means auto-detect from the available API keys
    #[serde(default)]
    pub provider: String,

    /// Empty means the provider's default model
    #[serde(default)]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Setting this makes Ollama eligible for auto-detection
    #[serde(default)]
    pub ollama_base_url: String,

    #[serde(default)]
    pub ollama_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendsConfig {
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_max_trends")]
    pub max_entries: usize,

    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    #[serde(default = "default_x_user_token_env")]
    pub user_token_env: String,

    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotsConfig {
    #[serde(default = "default_telegram_token_env")]
    pub telegram_token_env: String,

    /// Default destination for cycle reports before anyone has messaged the bot
    #[serde(default)]
    pub telegram_chat_id: String,

    #[serde(default = "default_discord_token_env")]
    pub discord_token_env: String,

    /// Channel the Discord bot listens on
    #[serde(default)]
    pub discord_channel_id: String,

    /// Empty allows everyone
    #[serde(default)]
    pub allowed_user_ids: Vec<String>,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("./data/trendposter.db")
}

fn default_check_interval() -> u64 {
    60
}

fn default_hours_start() -> u8 {
    8
}

fn default_hours_end() -> u8 {
    22
}

fn default_min_relevance_score() -> u8 {
    40
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_queue_size() -> usize {
    50
}

fn default_temperature() -> f64 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_llm_timeout() -> u64 {
    45
}

fn default_region() -> String {
    "united-states".to_string()
}

fn default_max_trends() -> usize {
    30
}

fn default_scrape_timeout() -> u64 {
    15
}

fn default_x_user_token_env() -> String {
    "X_USER_TOKEN".to_string()
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_telegram_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

fn default_discord_token_env() -> String {
    "DISCORD_BOT_TOKEN".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: default_check_interval(),
            posting_hours_start: default_hours_start(),
            posting_hours_end: default_hours_end(),
            min_relevance_score: default_min_relevance_score(),
            timezone: default_timezone(),
            auto_post: default_true(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_llm_timeout(),
            ollama_base_url: String::new(),
            ollama_model: String::new(),
        }
    }
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            max_entries: default_max_trends(),
            timeout_secs: default_scrape_timeout(),
        }
    }
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            user_token_env: default_x_user_token_env(),
            timeout_secs: default_publish_timeout(),
        }
    }
}

impl Default for BotsConfig {
    fn default() -> Self {
        Self {
            telegram_token_env: default_telegram_token_env(),
            telegram_chat_id: String::new(),
            discord_token_env: default_discord_token_env(),
            discord_channel_id: String::new(),
            allowed_user_ids: vec![],
        }
    }
}

impl AppConfig {
    /// Load configuration from file and the process environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    /// Load configuration, reading flat keys through `env`
    pub fn load_with(
        config_path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            bail!("Config file not found: {}", path.display());
        }

        // Namespaced overrides: TRENDPOSTER__SCHEDULE__TIMEZONE=...
        builder = builder.add_source(
            config::Environment::with_prefix("TRENDPOSTER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        for &(key, path) in FLAT_ENV_KEYS {
            let value = env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            builder = builder
                .set_override_option(path, value)
                .with_context(|| format!("Invalid value for {}", key))?;
        }

        let mut config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Some(raw) = env("ALLOWED_USER_IDS") {
            config.bots.allowed_user_ids = parse_id_list(&raw);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.schedule.check_interval_minutes == 0 {
            bail!("CHECK_INTERVAL_MINUTES must be a positive number of minutes");
        }
        if self.schedule.min_relevance_score > 100 {
            bail!(
                "MIN_RELEVANCE_SCORE must be between 0 and 100 (got {})",
                self.schedule.min_relevance_score
            );
        }
        if self.queue.max_queue_size == 0 {
            bail!("MAX_QUEUE_SIZE must be at least 1");
        }
        self.posting_window()?;
        Ok(())
    }

    pub fn posting_window(&self) -> Result<PostingWindow> {
        let tz = PostingWindow::parse_timezone(self.schedule.timezone.trim())
            .context("Invalid TIMEZONE")?;
        PostingWindow::new(
            self.schedule.posting_hours_start,
            self.schedule.posting_hours_end,
            tz,
        )
        .context("Invalid POSTING_HOURS_START/POSTING_HOURS_END")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# trendposter configuration
#
# Every key can also be set through the environment, either namespaced
# (TRENDPOSTER__SCHEDULE__TIMEZONE) or with the flat names noted below.
# API keys and bot tokens are only ever read from the environment.

[general]
database_path = "./data/trendposter.db"  # DATABASE_PATH

[schedule]
check_interval_minutes = 60  # CHECK_INTERVAL_MINUTES
posting_hours_start = 8      # POSTING_HOURS_START (0-23, inclusive)
posting_hours_end = 22       # POSTING_HOURS_END (0-23, exclusive)
min_relevance_score = 40     # MIN_RELEVANCE_SCORE (0-100)
timezone = "UTC"             # TIMEZONE (IANA name)
auto_post = true             # AUTO_POST; false disables the timer

[queue]
max_queue_size = 50  # MAX_QUEUE_SIZE

[llm]
# anthropic, openai, gemini, ollama or stub; empty picks the first of
# ANTHROPIC_API_KEY, OPENAI_API_KEY, GEMINI_API_KEY, OLLAMA_BASE_URL
provider = ""  # LLM_PROVIDER
model = ""     # LLM_MODEL; empty uses the provider default
temperature = 0.2
max_output_tokens = 1024
timeout_secs = 45
ollama_base_url = ""  # OLLAMA_BASE_URL
ollama_model = ""     # OLLAMA_MODEL

[trends]
region = "united-states"
max_entries = 30
timeout_secs = 15

[x]
user_token_env = "X_USER_TOKEN"
timeout_secs = 30

[bots]
telegram_token_env = "TELEGRAM_BOT_TOKEN"
telegram_chat_id = ""    # TELEGRAM_CHAT_ID
discord_token_env = "DISCORD_BOT_TOKEN"
discord_channel_id = ""  # DISCORD_CHANNEL_ID
allowed_user_ids = []    # ALLOWED_USER_IDS (comma separated); empty allows everyone
"#
        .to_string()
    }
}

/// Split a comma separated id list, dropping blanks
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("trendposter.toml");
        std::fs::write(&path, "")?;
        AppConfig::load_with(Some(&path), |key| vars.get(key).cloned())
    }

    #[test]
    fn test_example_toml_parses_to_defaults() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert_eq!(config.schedule.check_interval_minutes, 60);
        assert_eq!(config.schedule.posting_hours_start, 8);
        assert_eq!(config.schedule.posting_hours_end, 22);
        assert_eq!(config.schedule.min_relevance_score, 40);
        assert!(config.schedule.auto_post);
        assert_eq!(config.queue.max_queue_size, 50);
        assert!(config.llm.provider.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_flat_env_overrides() {
        let config = load(&[
            ("CHECK_INTERVAL_MINUTES", "15"),
            ("POSTING_HOURS_START", "9"),
            ("POSTING_HOURS_END", "17"),
            ("MIN_RELEVANCE_SCORE", "70"),
            ("TIMEZONE", "America/New_York"),
            ("AUTO_POST", "false"),
            ("LLM_PROVIDER", "ollama"),
            ("ALLOWED_USER_IDS", "12, 34,,56"),
        ])
        .unwrap();

        assert_eq!(config.schedule.check_interval_minutes, 15);
        assert_eq!(config.schedule.min_relevance_score, 70);
        assert!(!config.schedule.auto_post);
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.bots.allowed_user_ids, vec!["12", "34", "56"]);

        let window = config.posting_window().unwrap();
        assert_eq!(window.start_hour(), 9);
        assert_eq!(window.end_hour(), 17);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(load(&[("CHECK_INTERVAL_MINUTES", "0")]).is_err());
        assert!(load(&[("MIN_RELEVANCE_SCORE", "101")]).is_err());
        assert!(load(&[("TIMEZONE", "Mars/Olympus_Mons")]).is_err());
        assert!(load(&[("POSTING_HOURS_START", "22"), ("POSTING_HOURS_END", "8")]).is_err());
        assert!(load(&[("POSTING_HOURS_START", "10"), ("POSTING_HOURS_END", "10")]).is_err());
        assert!(load(&[("POSTING_HOURS_END", "24")]).is_err());
    }

    #[test]
    fn test_missing_explicit_config_file_fails() {
        let result = AppConfig::load_with(Some(Path::new("/nonexistent/trendposter.toml")), |_| {
            None
        });
        assert!(result.is_err());
    }
}
