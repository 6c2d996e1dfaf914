//! Config command - write an example configuration file

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::args::{ConfigArgs, ConfigCommands};
use crate::config::AppConfig;

pub async fn execute(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Init { path, force } => init_config(path, force).await,
    }
}

async fn init_config(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }

    let content = AppConfig::example_toml();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty() && !p.exists()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    println!("Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Export an LLM key (ANTHROPIC_API_KEY, OPENAI_API_KEY, GEMINI_API_KEY) or OLLAMA_BASE_URL");
    println!("  2. Export X_USER_TOKEN and TELEGRAM_BOT_TOKEN or DISCORD_BOT_TOKEN");
    println!("  3. Run 'trendposter doctor' to validate your setup");
    println!("  4. Queue a draft with 'trendposter queue add' and try 'trendposter cycle --dry-run'");

    Ok(())
}
