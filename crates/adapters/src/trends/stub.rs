//! Stub trend source for tests and offline runs

use async_trait::async_trait;
use std::sync::Mutex;
use trendposter_domain::{ScrapeError, TrendEntry, TrendSnapshot, TrendSource};

/// Returns a fixed list of topics, optionally failing first
pub struct StubTrendSource {
    topics: Vec<(String, f64)>,
    failures: Mutex<u32>,
}

impl StubTrendSource {
    pub fn new(topics: &[(&str, f64)]) -> Self {
        Self {
            topics: topics.iter().map(|(t, v)| (t.to_string(), *v)).collect(),
            failures: Mutex::new(0),
        }
    }

    /// Fail the next `n` fetches with a network error
    pub fn failing_first(self, n: u32) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            *failures = n;
        }
        self
    }
}

impl Default for StubTrendSource {
    fn default() -> Self {
        Self::new(&[("product launches", 90.0), ("mondays", 10.0)])
    }
}

#[async_trait]
impl TrendSource for StubTrendSource {
    async fn fetch(&self) -> Result<TrendSnapshot, ScrapeError> {
        {
            let mut failures = self
                .failures
                .lock()
                .map_err(|e| ScrapeError::Network(e.to_string()))?;
            if *failures > 0 {
                *failures -= 1;
                return Err(ScrapeError::Network("stub failure".to_string()));
            }
        }

        let entries = self
            .topics
            .iter()
            .map(|(topic, volume)| TrendEntry::new(topic.clone(), *volume))
            .collect();
        Ok(TrendSnapshot::new(time::OffsetDateTime::now_utc(), entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_fails_then_recovers() {
        let source = StubTrendSource::default().failing_first(1);

        assert!(source.fetch().await.is_err());
        let snapshot = source.fetch().await.unwrap();
        assert_eq!(snapshot.entries()[0].topic, "product launches");
    }
}
