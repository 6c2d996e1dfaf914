//! Chat platform adapters
//!
//! Each platform translates its native messages into [`IncomingMessage`]s and
//! sends plain-text replies. Command handling is platform independent and
//! lives in [`bridge`].

pub mod bridge;
pub mod discord;
pub mod telegram;

pub use bridge::{ChatBridge, ChatNotifier, ReplyTarget};
pub use discord::DiscordBot;
pub use telegram::TelegramBot;

use async_trait::async_trait;
use thiserror::Error;

/// A message received from a chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Where replies go (Telegram chat id, Discord channel id)
    pub chat_id: String,
    /// Platform user id of the sender
    pub sender_id: String,
    pub text: String,
}

/// Error type for chat platform operations
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Chat API error: {0}")]
    Api(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Network(e.to_string())
    }
}

/// A chat platform the bot can listen on and reply through
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Fetch messages received since the previous call
    async fn poll(&self) -> Result<Vec<IncomingMessage>, ChatError>;

    /// Send a plain-text message
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChatError>;

    fn name(&self) -> &'static str;
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Api(format!("{}: {}", status, body)))
}
