//! Chat command set shared by every bot platform

use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::{
    model::{CandidateId, PostStatus, Trigger},
    ports::{QueueError, QueueStore, TrendSource},
    usecases::{
        orchestrator::{CycleError, Orchestrator},
        render::{Renderer, StatusInfo, StatusView},
    },
};

static TRAILING_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<text>.*?)\s+p=(?P<priority>-?\d{1,6})\s*$")
        .expect("priority pattern is valid")
});

/// Number of recent posts shown by `status`
const RECENT_POSTS: usize = 3;

/// A platform-independent chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Queue { text: String, priority: i32 },
    List,
    Remove(CandidateId),
    Trends,
    Analyze,
    Post,
    Status,
    Help,
}

/// Problems turning a message into a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown command '{0}'. Try help.")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parse a chat message.
    ///
    /// Commands start with `/` or `!`; a Telegram-style `@botname` suffix on
    /// the command word is ignored. Messages without a prefix are not
    /// commands and yield `Ok(None)`.
    pub fn parse(message: &str) -> Result<Option<Command>, ParseError> {
        let message = message.trim();
        let Some(body) = message
            .strip_prefix('/')
            .or_else(|| message.strip_prefix('!'))
        else {
            return Ok(None);
        };

        let (word, rest) = match body.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (body, ""),
        };
        let name = word.split('@').next().unwrap_or(word).to_ascii_lowercase();

        let command = match name.as_str() {
            "queue" => {
                if rest.is_empty() {
                    return Err(ParseError::Usage("queue <text> [p=N]"));
                }
                match TRAILING_PRIORITY.captures(rest) {
                    Some(caps) => {
                        let priority = caps["priority"]
                            .parse()
                            .map_err(|_| ParseError::Usage("queue <text> [p=N]"))?;
                        Command::Queue {
                            text: caps["text"].trim().to_string(),
                            priority,
                        }
                    }
                    None => Command::Queue {
                        text: rest.to_string(),
                        priority: 0,
                    },
                }
            }
            "list" => Command::List,
            "remove" => {
                let id = rest
                    .trim_start_matches('#')
                    .parse()
                    .map_err(|_| ParseError::Usage("remove <id>"))?;
                Command::Remove(id)
            }
            "trends" => Command::Trends,
            "analyze" => Command::Analyze,
            "post" => Command::Post,
            "status" => Command::Status,
            "help" | "start" => Command::Help,
            other => return Err(ParseError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }
}

/// Executes commands against the queue and orchestrator and renders replies
pub struct CommandService {
    queue: Arc<dyn QueueStore>,
    trends: Arc<dyn TrendSource>,
    orchestrator: Arc<Orchestrator>,
    renderer: Renderer,
    info: Option<StatusInfo>,
}

impl CommandService {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        trends: Arc<dyn TrendSource>,
        orchestrator: Arc<Orchestrator>,
        renderer: Renderer,
    ) -> Self {
        Self {
            queue,
            trends,
            orchestrator,
            renderer,
            info: None,
        }
    }

    /// Static facts included in `status` replies
    pub fn with_status_info(mut self, info: StatusInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Parse and execute a raw message. Non-command messages yield `None`.
    pub async fn handle_message(&self, message: &str) -> Option<String> {
        match Command::parse(message) {
            Ok(Some(command)) => Some(self.execute(command).await),
            Ok(None) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    /// Execute one command and return the reply text
    pub async fn execute(&self, command: Command) -> String {
        tracing::info!(command = ?command, "Executing command");

        match command {
            Command::Queue { text, priority } => match self.queue.enqueue(&text, priority).await {
                Ok(post) => {
                    let queued = self
                        .queue
                        .counts()
                        .await
                        .map(|c| c.queued)
                        .unwrap_or_default();
                    format!(
                        "Queued #{}\n\"{}\"\n{} post(s) in queue",
                        post.id, post.text, queued
                    )
                }
                Err(e) => self.queue_error_reply(e),
            },
            Command::List => match self.queue.list(Some(PostStatus::Queued)).await {
                Ok(posts) => self.renderer.render_queue(&posts),
                Err(e) => self.queue_error_reply(e),
            },
            Command::Remove(id) => match self.queue.remove(id).await {
                Ok(()) => format!("Removed #{}", id),
                Err(QueueError::NotFound(_)) => format!("Post #{} not found in queue", id),
                Err(e) => self.queue_error_reply(e),
            },
            Command::Trends => {
                let timeout = self.orchestrator.config().scrape_timeout;
                match tokio::time::timeout(timeout, self.trends.fetch()).await {
                    Ok(Ok(snapshot)) => self.renderer.render_trends(&snapshot),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Trend fetch for command failed");
                        format!("Couldn't fetch trends right now: {}", e)
                    }
                    Err(_) => "Couldn't fetch trends right now: timed out".to_string(),
                }
            }
            Command::Analyze => self.trigger(Trigger::DryRun).await,
            Command::Post => self.trigger(Trigger::Manual).await,
            Command::Status => self.status().await,
            Command::Help => self.renderer.help_text(),
        }
    }

    async fn trigger(&self, trigger: Trigger) -> String {
        match self.orchestrator.run_cycle(trigger).await {
            Ok(report) if report.dry_run => self.renderer.render_report(&report),
            // Full report already went out through the notifier
            Ok(report) => format!("Cycle finished: {}", report.record.outcome),
            Err(CycleError::AlreadyRunning) => CycleError::AlreadyRunning.to_string(),
        }
    }

    async fn status(&self) -> String {
        let counts = match self.queue.counts().await {
            Ok(counts) => counts,
            Err(e) => return self.queue_error_reply(e),
        };
        let latest = self.queue.latest_cycle().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load latest cycle");
            None
        });
        let recent = self
            .queue
            .recent_posted(RECENT_POSTS)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load recent posts");
                Vec::new()
            });

        self.renderer.render_status(&StatusView {
            info: self.info.as_ref(),
            cycle_state: Some(self.orchestrator.state().to_string()),
            latest: latest.as_ref(),
            counts,
            recent: &recent,
        })
    }

    fn queue_error_reply(&self, error: QueueError) -> String {
        match error {
            QueueError::Validation(msg) => format!("Not queued: {}", msg),
            QueueError::QueueFull { max } => format!("Queue is full ({} posts max)", max),
            other => {
                tracing::error!(error = %other, "Queue operation failed");
                format!("Queue error: {}", other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_with_priority() {
        let cmd = Command::parse("/queue Big launch today p=3").unwrap();
        assert_eq!(
            cmd,
            Some(Command::Queue {
                text: "Big launch today".to_string(),
                priority: 3
            })
        );
    }

    #[test]
    fn test_parse_queue_plain_text_keeps_everything() {
        let cmd = Command::parse("!queue Happy Monday everyone").unwrap();
        assert_eq!(
            cmd,
            Some(Command::Queue {
                text: "Happy Monday everyone".to_string(),
                priority: 0
            })
        );
    }

    #[test]
    fn test_parse_strips_bot_mention() {
        assert_eq!(
            Command::parse("/status@trend_bot").unwrap(),
            Some(Command::Status)
        );
        assert_eq!(Command::parse("/start").unwrap(), Some(Command::Help));
    }

    #[test]
    fn test_parse_remove_requires_numeric_id() {
        assert_eq!(Command::parse("/remove #12").unwrap(), Some(Command::Remove(12)));
        assert_eq!(
            Command::parse("/remove abc"),
            Err(ParseError::Usage("remove <id>"))
        );
    }

    #[test]
    fn test_parse_ignores_plain_messages_and_rejects_unknown() {
        assert_eq!(Command::parse("hello there").unwrap(), None);
        assert_eq!(
            Command::parse("/dance"),
            Err(ParseError::Unknown("dance".to_string()))
        );
        assert_eq!(
            Command::parse("/queue"),
            Err(ParseError::Usage("queue <text> [p=N]"))
        );
    }
}
