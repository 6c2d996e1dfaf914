//! Telegram Bot API adapter (long polling)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use trendposter_domain::usecases::truncate_to_length;

use super::{ChatError, ChatPlatform, IncomingMessage, check_status};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
/// Telegram rejects longer messages
const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram bot using `getUpdates` long polling
pub struct TelegramBot {
    client: Client,
    token: SecretString,
    base_url: String,
    long_poll_secs: u64,
    offset: Mutex<Option<i64>>,
}

impl TelegramBot {
    pub fn new(token: SecretString) -> Result<Self, ChatError> {
        Self::with_base_url(token, DEFAULT_BASE_URL.to_string(), 25)
    }

    pub fn with_base_url(
        token: SecretString,
        base_url: String,
        long_poll_secs: u64,
    ) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(long_poll_secs + 10))
            .build()?;

        Ok(Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            long_poll_secs,
            offset: Mutex::new(None),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            method
        )
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct User {
    id: i64,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[async_trait]
impl ChatPlatform for TelegramBot {
    async fn poll(&self) -> Result<Vec<IncomingMessage>, ChatError> {
        let mut offset = self.offset.lock().await;

        let mut query = vec![("timeout", self.long_poll_secs.to_string())];
        if let Some(next) = *offset {
            query.push(("offset", next.to_string()));
        }

        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .send()
            .await?;

        let body: ApiResponse<Vec<Update>> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;

        if !body.ok {
            return Err(ChatError::Api(body.description.unwrap_or_default()));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            *offset = Some(last + 1);
        }

        Ok(updates
            .into_iter()
            .filter_map(|u| u.message)
            .filter_map(|m| {
                Some(IncomingMessage {
                    chat_id: m.chat.id.to_string(),
                    sender_id: m.from?.id.to_string(),
                    text: m.text?,
                })
            })
            .collect())
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        let text = truncate_to_length(text, MAX_MESSAGE_CHARS);
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest {
                chat_id,
                text: &text,
            })
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bot(server: &MockServer) -> TelegramBot {
        TelegramBot::with_base_url(SecretString::new("123:abc".into()), server.uri(), 0).unwrap()
    }

    #[tokio::test]
    async fn test_poll_advances_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bot123:abc/getUpdates"))
            .and(query_param("offset", "43"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": []})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bot123:abc/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [
                    {"update_id": 41, "message": {
                        "message_id": 1, "chat": {"id": -100}, "from": {"id": 7},
                        "text": "/queue hello"
                    }},
                    {"update_id": 42, "message": {
                        "message_id": 2, "chat": {"id": -100}, "from": {"id": 7}
                    }}
                ]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let bot = bot(&server);
        let first = bot.poll().await.unwrap();
        assert_eq!(
            first,
            vec![IncomingMessage {
                chat_id: "-100".to_string(),
                sender_id: "7".to_string(),
                text: "/queue hello".to_string(),
            }]
        );

        assert!(bot.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(
                serde_json::json!({"chat_id": "-100", "text": "Queue is empty."}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        bot(&server).send("-100", "Queue is empty.").await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        assert!(matches!(bot(&server).poll().await, Err(ChatError::Api(_))));
    }
}
