//! trendposter CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod args;
mod commands;
mod config;
mod wiring;

use args::{Cli, Commands, LogFormat};

const DEFAULT_ENV_PATH: &str = "./.env";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Before anything reads the environment
    load_dotenv(cli.env.as_deref())?;

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    init_logging(&log_level, cli.log_format)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.config).await,
        Commands::Queue(args) => commands::queue::execute(args, cli.config).await,
        Commands::Cycle(args) => commands::cycle::execute(args, cli.config).await,
        Commands::Status => commands::status::execute(cli.config).await,
        Commands::Config(args) => commands::config::execute(args).await,
        Commands::Doctor(args) => commands::doctor::execute(args, cli.config).await,
    }
}

/// Load `path`, or `./.env` when present. Variables already set win.
fn load_dotenv(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file: {}", path.display()))?;
        }
        None => {
            let default = PathBuf::from(DEFAULT_ENV_PATH);
            if default.exists() {
                dotenvy::from_path(&default).context("Failed to load ./.env")?;
            }
        }
    }
    Ok(())
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init(),
    }

    Ok(())
}
