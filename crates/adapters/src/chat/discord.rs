//! Discord REST adapter polling a single channel

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use trendposter_domain::usecases::truncate_to_length;

use super::{ChatError, ChatPlatform, IncomingMessage, check_status};

const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";
/// Discord rejects longer messages
const MAX_MESSAGE_CHARS: usize = 2000;
const PAGE_SIZE: u32 = 50;

/// Discord bot reading one channel through the REST API
pub struct DiscordBot {
    client: Client,
    token: SecretString,
    channel_id: String,
    base_url: String,
    /// Newest message id seen; `None` until the first poll
    cursor: Mutex<Option<u64>>,
}

impl DiscordBot {
    pub fn new(token: SecretString, channel_id: String) -> Result<Self, ChatError> {
        Self::with_base_url(token, channel_id, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(
        token: SecretString,
        channel_id: String,
        base_url: String,
    ) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            token,
            channel_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            cursor: Mutex::new(None),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }
}

#[derive(Deserialize)]
struct ChannelMessage {
    id: String,
    #[serde(default)]
    content: String,
    author: Author,
}

#[derive(Deserialize)]
struct Author {
    id: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    content: &'a str,
}

#[async_trait]
impl ChatPlatform for DiscordBot {
    async fn poll(&self) -> Result<Vec<IncomingMessage>, ChatError> {
        let mut cursor = self.cursor.lock().await;

        let mut query = vec![("limit", PAGE_SIZE.to_string())];
        if let Some(after) = *cursor {
            query.push(("after", after.to_string()));
        }

        let response = self
            .client
            .get(format!(
                "{}/channels/{}/messages",
                self.base_url, self.channel_id
            ))
            .header("Authorization", self.auth_header())
            .query(&query)
            .send()
            .await?;

        let page: Vec<ChannelMessage> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;

        let mut messages: Vec<(u64, ChannelMessage)> = page
            .into_iter()
            .filter_map(|m| m.id.parse::<u64>().ok().map(|id| (id, m)))
            .collect();
        messages.sort_by_key(|(id, _)| *id);

        let first_poll = cursor.is_none();
        if let Some((newest, _)) = messages.last() {
            *cursor = Some(*newest);
        } else if first_poll {
            *cursor = Some(0);
        }

        // History from before startup is not replayed
        if first_poll {
            return Ok(Vec::new());
        }

        Ok(messages
            .into_iter()
            .filter(|(_, m)| !m.author.bot && !m.content.is_empty())
            .map(|(_, m)| IncomingMessage {
                chat_id: self.channel_id.clone(),
                sender_id: m.author.id,
                text: m.content,
            })
            .collect())
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        let content = truncate_to_length(text, MAX_MESSAGE_CHARS);
        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.base_url, chat_id))
            .header("Authorization", self.auth_header())
            .json(&CreateMessageRequest { content: &content })
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bot(server: &MockServer) -> DiscordBot {
        DiscordBot::with_base_url(
            SecretString::new("discord-token".into()),
            "555".to_string(),
            server.uri(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_poll_only_sets_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/555/messages"))
            .and(query_param("after", "1002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "1004", "content": "!status", "author": {"id": "9", "bot": false}},
                {"id": "1003", "content": "Cycle finished", "author": {"id": "1", "bot": true}}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/555/messages"))
            .and(header("Authorization", "Bot discord-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "1002", "content": "!list", "author": {"id": "9"}},
                {"id": "1001", "content": "!help", "author": {"id": "9"}}
            ])))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let bot = bot(&server);
        assert!(bot.poll().await.unwrap().is_empty());

        let messages = bot.poll().await.unwrap();
        assert_eq!(
            messages,
            vec![IncomingMessage {
                chat_id: "555".to_string(),
                sender_id: "9".to_string(),
                text: "!status".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_send_truncates_long_replies() {
        let server = MockServer::start().await;
        let long = "word ".repeat(500);
        let expected = truncate_to_length(&long, MAX_MESSAGE_CHARS);
        Mock::given(method("POST"))
            .and(path("/channels/555/messages"))
            .and(body_json(serde_json::json!({"content": expected})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        bot(&server).send("555", &long).await.unwrap();
    }
}
