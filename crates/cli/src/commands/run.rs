//! Run command - timer loop plus the chat bot

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use trendposter_adapters::{
    chat::{ChatBridge, ChatNotifier, ChatPlatform, DiscordBot, ReplyTarget, TelegramBot},
    notify::LogNotifier,
};
use trendposter_domain::{
    Notifier, PublishError, SystemClock, Trigger,
    usecases::{CommandService, LlmMatcher, Orchestrator, Renderer},
};

use crate::args::{BotPlatform, RunArgs};
use crate::config::AppConfig;
use crate::wiring;

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let bot = if args.scheduler_only {
        None
    } else {
        Some(select_bot(args.bot, &config, |key| std::env::var(key).ok())?)
    };

    let queue = Arc::new(wiring::open_queue(&config).await?);
    let provider = wiring::build_provider(&config, |key| std::env::var(key).ok())?;
    let provider_kind = provider.kind();
    let trends = Arc::new(wiring::build_trend_source(&config)?);

    let publisher = wiring::build_publisher(&config)?;
    match publisher.verify().await {
        Ok(username) => tracing::info!(username = %username, "X credentials verified"),
        Err(PublishError::Auth(msg)) => bail!("X API credentials are invalid: {}", msg),
        Err(e) => tracing::warn!(error = %e, "Could not verify X credentials, continuing"),
    }

    let chat = match bot {
        Some(platform) => Some(build_chat(platform, &config)?),
        None => None,
    };

    let notifier: Arc<dyn Notifier> = match &chat {
        Some((platform, target)) => {
            Arc::new(ChatNotifier::new(Arc::clone(platform), Arc::clone(target)))
        }
        None => Arc::new(LogNotifier),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        trends.clone(),
        queue.clone(),
        Arc::new(LlmMatcher::new(Arc::new(provider))),
        Arc::new(publisher),
        notifier,
        Arc::new(SystemClock),
        wiring::orchestrator_config(&config)?,
    ));

    tracing::info!(
        provider = %provider_kind,
        bot = ?bot,
        auto_post = config.schedule.auto_post,
        interval_minutes = config.schedule.check_interval_minutes,
        database = %config.general.database_path.display(),
        "Starting trendposter"
    );

    let timer = {
        let orchestrator = Arc::clone(&orchestrator);
        let auto_post = config.schedule.auto_post;
        let period = Duration::from_secs(config.schedule.check_interval_minutes * 60);
        tokio::spawn(async move {
            if auto_post {
                run_timer(orchestrator, period).await;
            } else {
                tracing::info!("Auto-posting disabled; cycles run only on manual trigger");
                std::future::pending::<()>().await;
            }
        })
    };

    match chat {
        Some((platform, target)) => {
            let commands = Arc::new(
                CommandService::new(queue, trends, orchestrator, Renderer::default())
                    .with_status_info(wiring::status_info(&config, provider_kind)?),
            );
            let bridge = ChatBridge::new(platform, commands, target)
                .with_allowed_users(config.bots.allowed_user_ids.clone());
            bridge.run(shutdown_signal()).await;
        }
        None => shutdown_signal().await,
    }

    timer.abort();
    tracing::info!("trendposter stopped");
    Ok(())
}

async fn run_timer(orchestrator: Arc<Orchestrator>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(every_secs = period.as_secs(), "Scheduler running");

    loop {
        ticker.tick().await;
        match orchestrator.run_cycle(Trigger::Timer).await {
            Ok(report) => tracing::debug!(outcome = %report.record.outcome, "Timer cycle done"),
            Err(e) => tracing::info!(error = %e, "Timer tick skipped"),
        }
    }
}

/// Pick the chat platform: the requested one, else the first with a token
pub(crate) fn select_bot(
    requested: Option<BotPlatform>,
    config: &AppConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<BotPlatform> {
    let has_token = |var: &str| env(var).is_some_and(|v| !v.trim().is_empty());
    let telegram = has_token(&config.bots.telegram_token_env);
    let discord = has_token(&config.bots.discord_token_env);

    match requested {
        Some(BotPlatform::Telegram) if !telegram => {
            bail!("--bot telegram requires {}", config.bots.telegram_token_env)
        }
        Some(BotPlatform::Discord) if !discord => {
            bail!("--bot discord requires {}", config.bots.discord_token_env)
        }
        Some(platform) => Ok(platform),
        None if telegram => Ok(BotPlatform::Telegram),
        None if discord => Ok(BotPlatform::Discord),
        None => bail!(
            "No bot platform configured. Set {} or {}, or use --scheduler-only.",
            config.bots.telegram_token_env,
            config.bots.discord_token_env
        ),
    }
}

fn build_chat(
    platform: BotPlatform,
    config: &AppConfig,
) -> Result<(Arc<dyn ChatPlatform>, Arc<ReplyTarget>)> {
    match platform {
        BotPlatform::Telegram => {
            let token = wiring::load_token(&config.bots.telegram_token_env, "Telegram")?;
            let bot = TelegramBot::new(token).context("Failed to build Telegram bot")?;
            let target = ReplyTarget::new(Some(config.bots.telegram_chat_id.clone()));
            Ok((Arc::new(bot), Arc::new(target)))
        }
        BotPlatform::Discord => {
            let channel_id = config.bots.discord_channel_id.trim();
            if channel_id.is_empty() {
                bail!("Discord bot requires DISCORD_CHANNEL_ID");
            }
            let token = wiring::load_token(&config.bots.discord_token_env, "Discord")?;
            let bot = DiscordBot::new(token, channel_id.to_string())
                .context("Failed to build Discord bot")?;
            let target = ReplyTarget::new(Some(channel_id.to_string()));
            Ok((Arc::new(bot), Arc::new(target)))
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_select_bot_prefers_telegram() {
        let config = AppConfig::default();
        let env = env_with(&[("TELEGRAM_BOT_TOKEN", "t"), ("DISCORD_BOT_TOKEN", "d")]);
        assert_eq!(select_bot(None, &config, env).unwrap(), BotPlatform::Telegram);
    }

    #[test]
    fn test_select_bot_falls_back_to_discord() {
        let config = AppConfig::default();
        let env = env_with(&[("DISCORD_BOT_TOKEN", "d")]);
        assert_eq!(select_bot(None, &config, env).unwrap(), BotPlatform::Discord);
    }

    #[test]
    fn test_select_bot_requested_needs_token() {
        let config = AppConfig::default();
        let env = env_with(&[("TELEGRAM_BOT_TOKEN", "t")]);
        assert!(select_bot(Some(BotPlatform::Discord), &config, env).is_err());
    }

    #[test]
    fn test_select_bot_none_configured() {
        let config = AppConfig::default();
        let err = select_bot(None, &config, env_with(&[])).unwrap_err();
        assert!(err.to_string().contains("--scheduler-only"));
    }
}
