//! trendposter adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `queue`: SQLite and in-memory queue stores
//! - `trends`: Trend aggregator scraper
//! - `llm`: LLM completion providers (Anthropic, OpenAI, Gemini, Ollama)
//! - `x`: X (Twitter) publisher
//! - `chat`: Telegram and Discord bots, chat notifier
//! - `notify`: Log-only notifier

mod queue_memory;
mod queue_sqlite;

pub mod chat;
pub mod llm;
pub mod notify;
pub mod trends;
pub mod x_api;

/// Re-exports for queue store adapters
pub mod queue {
    pub use crate::queue_memory::InMemoryQueueStore;
    pub use crate::queue_sqlite::SqliteQueueStore;
}

/// Re-exports for X API adapters
pub mod x {
    pub use crate::x_api::{StubXPublisher, XPublisher};
}
