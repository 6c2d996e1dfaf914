//! Stub provider for testing and offline mode

use async_trait::async_trait;
use serde_json::json;
use trendposter_domain::{CompletionError, CompletionProvider};

enum Mode {
    Keywords,
    Fixed(String),
    Failing(String),
}

/// Provider that answers without a network call
///
/// The default mode reads the match prompt back and scores each candidate by
/// keyword overlap with the listed trends.
pub struct StubProvider {
    mode: Mode,
}

impl StubProvider {
    pub fn keywords() -> Self {
        Self {
            mode: Mode::Keywords,
        }
    }

    /// Always return `response` verbatim
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixed(response.into()),
        }
    }

    /// Always fail with an API error carrying `message`
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            mode: Mode::Failing(message.into()),
        }
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::keywords()
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        match &self.mode {
            Mode::Keywords => Ok(score_by_keywords(prompt)),
            Mode::Fixed(response) => Ok(response.clone()),
            Mode::Failing(message) => Err(CompletionError::Api(message.clone())),
        }
    }

    fn name(&self) -> &str {
        "stub"
    }
}

fn score_by_keywords(prompt: &str) -> String {
    let mut trends = Vec::new();
    let mut candidates = Vec::new();

    for line in prompt.lines() {
        if let Some(rest) = line.strip_prefix("[id ") {
            if let Some((id, text)) = rest.split_once("] ") {
                if let Ok(id) = id.parse::<i64>() {
                    candidates.push((id, text.to_lowercase()));
                }
            }
        } else if let Some((rank, topic)) = line.split_once(". ") {
            if !rank.is_empty() && rank.chars().all(|c| c.is_ascii_digit()) {
                trends.push(topic.trim().to_string());
            }
        }
    }

    let matches: Vec<_> = candidates
        .iter()
        .map(|(id, text)| {
            let hit = trends.iter().find(|topic| {
                topic
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word.chars().count() >= 3 && text.contains(word))
            });
            match hit {
                Some(topic) => json!({
                    "id": id,
                    "relevance_score": 90,
                    "trend": topic,
                    "rationale": format!("mentions {}", topic),
                }),
                None => json!({
                    "id": id,
                    "relevance_score": 10,
                    "trend": trends.first().cloned().unwrap_or_default(),
                    "rationale": "no keyword overlap",
                }),
            }
        })
        .collect();

    json!({ "matches": matches }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::OffsetDateTime;
    use trendposter_domain::usecases::LlmMatcher;
    use trendposter_domain::{CandidatePost, Matcher, TrendEntry, TrendSnapshot};

    #[tokio::test]
    async fn test_keyword_mode_round_trips_through_matcher() {
        let now = OffsetDateTime::now_utc();
        let snapshot = TrendSnapshot::new(
            now,
            vec![
                TrendEntry::new("#WorldCup", 500_000.0),
                TrendEntry::new("Mondays", 20_000.0),
            ],
        );
        let candidates = vec![
            CandidatePost::queued(1, "Nothing ruins a week like mondays".to_string(), 0, now),
            CandidatePost::queued(2, "New espresso blend is out".to_string(), 0, now),
        ];

        let matcher = LlmMatcher::new(Arc::new(StubProvider::keywords()));
        let results = matcher.score(&snapshot, &candidates).await.unwrap();

        assert_eq!(results[0].candidate_id, 1);
        assert_eq!(results[0].relevance_score, 90);
        assert_eq!(results[0].trend_topic, "Mondays");
        assert_eq!(results[1].relevance_score, 10);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let stub = StubProvider::with_error("boom");
        assert!(matches!(
            stub.complete("x").await,
            Err(CompletionError::Api(msg)) if msg == "boom"
        ));
    }
}
