//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// trendposter: publishes queued drafts when they match what is trending
#[derive(Parser, Debug)]
#[command(name = "trendposter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to .env file (default: ./.env when present)
    #[arg(long, global = true)]
    pub env: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); falls back to LOG_LEVEL
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the scheduler and the chat bot
    Run(RunArgs),

    /// Manage the post queue
    Queue(QueueArgs),

    /// Run one manual cycle now
    Cycle(CycleArgs),

    /// Show the latest cycle and queue counts
    Status,

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and credentials
    Doctor(DoctorArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BotPlatform {
    Telegram,
    Discord,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Chat platform to attach (auto-detected from configured tokens)
    #[arg(long, value_enum, conflicts_with = "scheduler_only")]
    pub bot: Option<BotPlatform>,

    /// Run only the timer; manage the queue with `trendposter queue`
    #[arg(long)]
    pub scheduler_only: bool,
}

#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Add a draft post
    Add {
        /// Post text
        text: String,

        /// Higher priority wins ties
        #[arg(long, short, default_value_t = 0, allow_hyphen_values = true)]
        priority: i32,
    },

    /// List posts (queued only unless --status or --all is given)
    List {
        /// Filter by status (queued, posted, failed, removed)
        #[arg(long, conflicts_with = "all")]
        status: Option<String>,

        /// Show posts in every status
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a queued post
    Remove {
        /// Post id
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct CycleArgs {
    /// Decide without publishing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./trendposter.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
