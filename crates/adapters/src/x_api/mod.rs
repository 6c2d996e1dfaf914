//! X (Twitter) API adapters

mod write;

pub use write::XPublisher;

use async_trait::async_trait;
use std::sync::Mutex;
use trendposter_domain::{PublishError, PublishResult, Publisher};

/// Publisher that records posts instead of sending them
pub struct StubXPublisher {
    published: Mutex<Vec<String>>,
}

impl StubXPublisher {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(vec![]),
        }
    }

    /// Texts published so far, oldest first
    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Default for StubXPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for StubXPublisher {
    async fn publish(&self, text: &str) -> Result<PublishResult, PublishError> {
        let mut published = self
            .published
            .lock()
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;
        published.push(text.to_string());
        let id = format!("stub_{}", published.len());

        Ok(PublishResult {
            url: Some(format!("https://x.com/stub/status/{}", id)),
            id,
        })
    }

    fn platform(&self) -> &'static str {
        "x"
    }
}
