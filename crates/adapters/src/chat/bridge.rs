//! Connects a chat platform to the command service and the cycle notifier

use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use trendposter_domain::usecases::{Command, CommandService, Renderer};
use trendposter_domain::{CycleRecord, NotifyError, Notifier};

use super::{ChatPlatform, IncomingMessage};

const UNAUTHORIZED_REPLY: &str = "Unauthorized.";

/// The chat that cycle reports are delivered to
///
/// Starts at the configured default (if any) and follows whichever chat
/// most recently issued a command.
#[derive(Debug, Default)]
pub struct ReplyTarget {
    chat_id: RwLock<Option<String>>,
}

impl ReplyTarget {
    pub fn new(default_chat: Option<String>) -> Self {
        Self {
            chat_id: RwLock::new(default_chat.filter(|c| !c.trim().is_empty())),
        }
    }

    pub fn set(&self, chat_id: &str) {
        if let Ok(mut current) = self.chat_id.write() {
            *current = Some(chat_id.to_string());
        }
    }

    pub fn get(&self) -> Option<String> {
        self.chat_id.read().ok().and_then(|c| c.clone())
    }
}

/// Delivers cycle reports to the current [`ReplyTarget`]
pub struct ChatNotifier {
    platform: Arc<dyn ChatPlatform>,
    target: Arc<ReplyTarget>,
    renderer: Renderer,
}

impl ChatNotifier {
    pub fn new(platform: Arc<dyn ChatPlatform>, target: Arc<ReplyTarget>) -> Self {
        Self {
            platform,
            target,
            renderer: Renderer::default(),
        }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn report(&self, record: &CycleRecord) -> Result<(), NotifyError> {
        let chat_id = self.target.get().ok_or(NotifyError::NoDestination)?;
        self.platform
            .send(&chat_id, &self.renderer.render_record(record))
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

/// Poll loop feeding chat messages into the [`CommandService`]
pub struct ChatBridge {
    platform: Arc<dyn ChatPlatform>,
    commands: Arc<CommandService>,
    target: Arc<ReplyTarget>,
    allowed_users: HashSet<String>,
    poll_interval: Duration,
}

impl ChatBridge {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        commands: Arc<CommandService>,
        target: Arc<ReplyTarget>,
    ) -> Self {
        Self {
            platform,
            commands,
            target,
            allowed_users: HashSet::new(),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Restrict commands to these sender ids; an empty set allows everyone
    pub fn with_allowed_users(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.allowed_users = ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn is_allowed(&self, sender_id: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(sender_id)
    }

    /// Dispatch one message. Commands run on their own task so a long cycle
    /// never blocks polling; the handle is returned for callers that wait.
    pub fn dispatch(&self, message: IncomingMessage) -> Option<JoinHandle<()>> {
        if matches!(Command::parse(&message.text), Ok(None)) {
            return None;
        }

        let platform = Arc::clone(&self.platform);

        if !self.is_allowed(&message.sender_id) {
            tracing::warn!(
                platform = platform.name(),
                sender_id = %message.sender_id,
                "Rejected command from unauthorized user"
            );
            return Some(tokio::spawn(async move {
                if let Err(e) = platform.send(&message.chat_id, UNAUTHORIZED_REPLY).await {
                    tracing::warn!(error = %e, "Failed to send reply");
                }
            }));
        }

        self.target.set(&message.chat_id);
        let commands = Arc::clone(&self.commands);

        Some(tokio::spawn(async move {
            let Some(reply) = commands.handle_message(&message.text).await else {
                return;
            };
            if let Err(e) = platform.send(&message.chat_id, &reply).await {
                tracing::warn!(
                    platform = platform.name(),
                    chat_id = %message.chat_id,
                    error = %e,
                    "Failed to send reply"
                );
            }
        }))
    }

    /// Poll until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tracing::info!(platform = self.platform.name(), "Chat bridge started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                polled = self.platform.poll() => match polled {
                    Ok(messages) => {
                        for message in messages {
                            self.dispatch(message);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(platform = self.platform.name(), error = %e, "Chat poll failed");
                        tokio::select! {
                            _ = tokio::time::sleep(self.poll_interval * 5) => {}
                            _ = &mut shutdown => break,
                        }
                        continue;
                    }
                },
                _ = &mut shutdown => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = &mut shutdown => break,
            }
        }

        tracing::info!(platform = self.platform.name(), "Chat bridge stopped");
    }
}
