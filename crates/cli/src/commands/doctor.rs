//! Doctor command - validate configuration and credentials

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use trendposter_adapters::llm::ProviderKind;
use trendposter_domain::QueueStore;

use crate::args::DoctorArgs;
use crate::config::AppConfig;
use crate::wiring;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    llm: CheckResult,
    x: CheckResult,
    bots: CheckResult,
    database: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        llm: CheckResult::error("Not checked"),
        x: CheckResult::error("Not checked"),
        bots: CheckResult::error("Not checked"),
        database: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = check_config(&c);
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        let env = |key: &str| std::env::var(key).ok();
        report.llm = check_llm(config, env);
        report.x = check_x(config, env);
        report.bots = check_bots(config, env);
        report.database = check_database(config).await;
    }

    let checks = [
        &report.config,
        &report.llm,
        &report.x,
        &report.bots,
        &report.database,
    ];

    report.overall = if checks.iter().any(|c| c.is_error()) {
        "error".to_string()
    } else if checks.iter().all(|c| c.is_ok()) {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

fn check_config(config: &AppConfig) -> CheckResult {
    let schedule = &config.schedule;
    CheckResult::ok(format!(
        "Every {} min, window {:02}:00-{:02}:00 {}, min score {}",
        schedule.check_interval_minutes,
        schedule.posting_hours_start,
        schedule.posting_hours_end,
        schedule.timezone,
        schedule.min_relevance_score
    ))
    .with_details(serde_json::json!({
        "auto_post": schedule.auto_post,
        "max_queue_size": config.queue.max_queue_size,
    }))
}

fn check_llm(config: &AppConfig, env: impl Fn(&str) -> Option<String>) -> CheckResult {
    match wiring::resolve_provider(config, env) {
        Ok(ProviderKind::Stub) => CheckResult::warn("Provider: stub (offline keyword scoring)"),
        Ok(kind) => {
            let detail = match kind.credential_var() {
                Some(var) => format!("API key: {} (set)", var),
                None => format!(
                    "base_url: {}",
                    match config.llm.ollama_base_url.trim() {
                        "" => trendposter_adapters::llm::ollama::DEFAULT_BASE_URL,
                        url => url,
                    }
                ),
            };
            CheckResult::ok(format!("Provider: {}, {}", kind, detail))
        }
        Err(e) => CheckResult::error(format!("{:#}", e)),
    }
}

fn check_x(config: &AppConfig, env: impl Fn(&str) -> Option<String>) -> CheckResult {
    let var = &config.x.user_token_env;
    if var.trim().is_empty() {
        return CheckResult::error("No X user token env var configured");
    }

    match env(var) {
        Some(val) if !val.trim().is_empty() => {
            CheckResult::ok(format!("User token: {} (set)", var))
        }
        _ => CheckResult::error(format!("User token: {} (not set)", var)),
    }
}

fn check_bots(config: &AppConfig, env: impl Fn(&str) -> Option<String>) -> CheckResult {
    let bots = &config.bots;
    let is_set = |var: &str| env(var).is_some_and(|v| !v.trim().is_empty());

    let mut platforms = Vec::new();
    if is_set(&bots.telegram_token_env) {
        platforms.push("telegram");
    }
    if is_set(&bots.discord_token_env) {
        if bots.discord_channel_id.trim().is_empty() {
            return CheckResult::error(format!(
                "{} is set but DISCORD_CHANNEL_ID is empty",
                bots.discord_token_env
            ));
        }
        platforms.push("discord");
    }

    let details = serde_json::json!({
        "platforms": platforms,
        "allowed_user_ids": bots.allowed_user_ids.len(),
    });

    if platforms.is_empty() {
        CheckResult::warn(format!(
            "No bot token set ({} / {}); only --scheduler-only will start",
            bots.telegram_token_env, bots.discord_token_env
        ))
        .with_details(details)
    } else {
        CheckResult::ok(format!("Platforms: {}", platforms.join(", "))).with_details(details)
    }
}

async fn check_database(config: &AppConfig) -> CheckResult {
    let path = config.general.database_path.display().to_string();
    let queue = match wiring::open_queue(config).await {
        Ok(queue) => queue,
        Err(e) => return CheckResult::error(format!("{:#}", e)),
    };

    match queue.counts().await {
        Ok(counts) => CheckResult::ok(format!("{} ({} queued)", path, counts.queued))
            .with_details(serde_json::json!(counts)),
        Err(e) => CheckResult::error(format!("Failed to read {}: {}", path, e)),
    }
}

fn print_report(report: &DoctorReport) {
    println!("trendposter Doctor Report");
    println!("=========================");
    println!();

    print_check("Config", &report.config);
    print_check("LLM Provider", &report.llm);
    print_check("X", &report.x);
    print_check("Bots", &report.bots);
    print_check("Database", &report.database);

    println!();
    println!(
        "{} Overall: {}",
        symbol(&report.overall),
        report.overall.to_uppercase()
    );

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: trendposter cycle --dry-run");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    println!("{} {}: {}", symbol(&result.status), name, result.message);
}

fn symbol(status: &str) -> &'static str {
    match status {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_x_requires_token() {
        let config = AppConfig::default();
        assert!(check_x(&config, |_| None).is_error());
        assert!(check_x(&config, |_| Some("token".to_string())).is_ok());
    }

    #[test]
    fn test_check_bots_discord_needs_channel() {
        let config = AppConfig::default();
        let env = |key: &str| (key == "DISCORD_BOT_TOKEN").then(|| "d".to_string());
        assert!(check_bots(&config, env).is_error());

        let mut config = AppConfig::default();
        config.bots.discord_channel_id = "123".to_string();
        assert!(check_bots(&config, env).is_ok());
    }

    #[test]
    fn test_check_bots_none_is_warning() {
        let result = check_bots(&AppConfig::default(), |_| None);
        assert_eq!(result.status, "warn");
    }

    #[test]
    fn test_check_llm_reports_missing_provider() {
        assert!(check_llm(&AppConfig::default(), |_| None).is_error());
    }
}
