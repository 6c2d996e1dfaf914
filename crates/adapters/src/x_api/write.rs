//! X API write adapter for publishing posts

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trendposter_domain::{PLATFORM_MAX_CHARS, PublishError, PublishResult, Publisher};

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// X API publisher for creating posts
pub struct XPublisher {
    client: Client,
    user_token: SecretString,
    base_url: String,
    max_chars: usize,
}

impl XPublisher {
    pub fn new(user_token: SecretString, timeout: Duration) -> Result<Self, PublishError> {
        Self::with_base_url(user_token, DEFAULT_BASE_URL.to_string(), timeout)
    }

    pub fn with_base_url(
        user_token: SecretString,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Network(e.to_string()))?;

        Ok(Self {
            client,
            user_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_chars: PLATFORM_MAX_CHARS,
        })
    }

    /// Check the token by resolving the authenticated account's handle
    pub async fn verify(&self) -> Result<String, PublishError> {
        let response = self
            .client
            .get(format!("{}/2/users/me", self.base_url))
            .bearer_auth(self.user_token.expose_secret())
            .send()
            .await
            .map_err(map_send_error)?;

        let response = check_status(response).await?;
        let me: MeResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;
        Ok(me.data.username)
    }
}

#[derive(Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize)]
struct MeResponse {
    data: MeData,
}

#[derive(Deserialize)]
struct MeData {
    username: String,
}

fn map_send_error(e: reqwest::Error) -> PublishError {
    if e.is_timeout() {
        PublishError::Timeout
    } else {
        PublishError::Network(e.to_string())
    }
}

/// Sort failures into transient and permanent
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => PublishError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PublishError::Auth(format!("{}: {}", status, body))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PublishError::Timeout,
        s if s.is_server_error() => PublishError::Unavailable(format!("{}: {}", status, body)),
        _ => PublishError::Rejected(format!("{}: {}", status, body)),
    })
}

#[async_trait]
impl Publisher for XPublisher {
    async fn publish(&self, text: &str) -> Result<PublishResult, PublishError> {
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let response = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(self.user_token.expose_secret())
            .json(&CreateTweetRequest { text })
            .send()
            .await
            .map_err(map_send_error)?;

        let tweet: CreateTweetResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Unconfirmed(format!("unreadable 2xx response: {}", e)))?;

        tracing::info!(post_id = %tweet.data.id, "Published to X");

        Ok(PublishResult {
            url: Some(format!("https://x.com/i/status/{}", tweet.data.id)),
            id: tweet.data.id,
        })
    }

    fn platform(&self) -> &'static str {
        "x"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendposter_domain::Transient;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(server: &MockServer) -> XPublisher {
        XPublisher::with_base_url(
            SecretString::new("test-token".into()),
            server.uri(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn respond_with(status: u16) -> Result<PublishResult, PublishError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;
        publisher(&server).publish("hello").await
    }

    #[tokio::test]
    async fn test_publish_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_json(serde_json::json!({"text": "Just shipped a new feature!"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": {"id": "1790000000000000000", "text": "Just shipped a new feature!"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = publisher(&server)
            .publish("Just shipped a new feature!")
            .await
            .unwrap();

        assert_eq!(result.id, "1790000000000000000");
        assert_eq!(
            result.url.as_deref(),
            Some("https://x.com/i/status/1790000000000000000")
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let rate_limited = respond_with(429).await.unwrap_err();
        assert!(matches!(rate_limited, PublishError::RateLimited));
        assert!(rate_limited.is_transient());

        let unavailable = respond_with(503).await.unwrap_err();
        assert!(matches!(unavailable, PublishError::Unavailable(_)));
        assert!(unavailable.is_transient());

        let auth = respond_with(401).await.unwrap_err();
        assert!(matches!(auth, PublishError::Auth(_)));
        assert!(!auth.is_transient());

        let rejected = respond_with(400).await.unwrap_err();
        assert!(matches!(rejected, PublishError::Rejected(_)));
        assert!(!rejected.is_transient());
    }

    #[tokio::test]
    async fn test_unreadable_success_body_is_unconfirmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(201).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = publisher(&server).publish("hello").await.unwrap_err();
        assert!(matches!(err, PublishError::Unconfirmed(_)));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("may be live"));
    }

    #[tokio::test]
    async fn test_publish_content_too_long_never_sends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let text = "é".repeat(281);
        let result = publisher(&server).publish(&text).await;
        assert!(matches!(
            result,
            Err(PublishError::ContentTooLong { len: 281, max: 280 })
        ));
    }

    #[tokio::test]
    async fn test_length_counts_characters_not_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"id": "7"}})),
            )
            .mount(&server)
            .await;

        let text = "é".repeat(280);
        assert_eq!(publisher(&server).publish(&text).await.unwrap().id, "7");
    }

    #[tokio::test]
    async fn test_verify_returns_username() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"id": "1", "name": "Poster", "username": "poster"}
            })))
            .mount(&server)
            .await;

        assert_eq!(publisher(&server).verify().await.unwrap(), "poster");
    }
}
