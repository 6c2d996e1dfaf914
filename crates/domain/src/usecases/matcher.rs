//! LLM-backed matcher: scores queued candidates against trending topics

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    model::{CandidateId, CandidatePost, MatchResult, TrendSnapshot},
    ports::{CompletionProvider, MatchError, Matcher},
};

/// Scores candidates with one completion call, plus one stricter retry when
/// the first response cannot be parsed
pub struct LlmMatcher<P: CompletionProvider + ?Sized> {
    provider: Arc<P>,
}

impl<P: CompletionProvider + ?Sized> LlmMatcher<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: CompletionProvider + ?Sized> Matcher for LlmMatcher<P> {
    async fn score(
        &self,
        snapshot: &TrendSnapshot,
        candidates: &[CandidatePost],
    ) -> Result<Vec<MatchResult>, MatchError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!(
            provider = self.provider.name(),
            candidates = candidates.len(),
            trends = snapshot.len(),
            "Scoring candidates"
        );

        let prompt = build_match_prompt(snapshot, candidates);
        let response = self.provider.complete(&prompt).await?;

        match parse_match_response(&response, candidates) {
            Ok(results) => Ok(results),
            Err(first_error) => {
                tracing::warn!(error = %first_error, "Unparseable match response, asking again");
                let strict = build_reformat_prompt(&prompt, &first_error);
                let response = self.provider.complete(&strict).await?;
                parse_match_response(&response, candidates).map_err(MatchError::Parse)
            }
        }
    }
}

/// Build the scoring prompt
pub fn build_match_prompt(snapshot: &TrendSnapshot, candidates: &[CandidatePost]) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You decide which queued social media post best fits what is trending right now.\n\n",
    );

    prompt.push_str("## Trending Topics (most popular first)\n");
    for (i, entry) in snapshot.entries().iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, entry.topic));
    }
    prompt.push('\n');

    prompt.push_str("## Candidate Posts\n");
    for candidate in candidates {
        prompt.push_str(&format!("[id {}] {}\n", candidate.id, candidate.text));
    }
    prompt.push('\n');

    prompt.push_str(
        r#"## Output Format
Respond with ONLY a JSON object matching this exact schema:
{
  "matches": [
    {
      "id": <candidate id as integer>,
      "relevance_score": <integer 0-100>,
      "trend": "the single most relevant trending topic",
      "rationale": "one short sentence"
    }
  ]
}

Rules:
- Include exactly one entry for every candidate id listed above
- Score how naturally the post fits the conversation around the trend
- 0 means unrelated, 100 means the post is obviously about that trend
"#,
    );

    prompt
}

fn build_reformat_prompt(original: &str, error: &str) -> String {
    format!(
        "{}\nYour previous answer was rejected: {}.\n\
         Return ONLY the JSON object. No prose, no markdown, no code fences. \
         Every candidate id must appear exactly once.\n",
        original, error
    )
}

#[derive(Debug, Deserialize)]
struct MatchEnvelope {
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    id: CandidateId,
    relevance_score: i64,
    #[serde(default)]
    trend: String,
    #[serde(default)]
    rationale: String,
}

/// Parse a provider response into exactly one result per candidate, in
/// candidate order
pub fn parse_match_response(
    response: &str,
    candidates: &[CandidatePost],
) -> Result<Vec<MatchResult>, String> {
    let json_str = extract_json(response);
    let envelope: MatchEnvelope =
        serde_json::from_str(json_str).map_err(|e| format!("Failed to parse JSON: {}", e))?;

    let mut by_id: HashMap<CandidateId, RawMatch> = HashMap::new();
    for raw in envelope.matches {
        if !candidates.iter().any(|c| c.id == raw.id) {
            return Err(format!("unknown candidate id {}", raw.id));
        }
        if !(0..=100).contains(&raw.relevance_score) {
            return Err(format!(
                "score {} for candidate {} is outside 0-100",
                raw.relevance_score, raw.id
            ));
        }
        let id = raw.id;
        if by_id.insert(id, raw).is_some() {
            return Err(format!("candidate {} scored more than once", id));
        }
    }

    candidates
        .iter()
        .map(|candidate| {
            let raw = by_id
                .remove(&candidate.id)
                .ok_or_else(|| format!("missing score for candidate {}", candidate.id))?;
            Ok(MatchResult {
                candidate_id: candidate.id,
                trend_topic: raw.trend.trim().to_string(),
                relevance_score: raw.relevance_score as u8,
                rationale: raw.rationale.trim().to_string(),
            })
        })
        .collect()
}

/// Extract JSON from response (handles markdown code blocks and leading prose)
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // Check for ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        if let Some(end) = trimmed[start + 7..].find("```") {
            return trimmed[start + 7..start + 7 + end].trim();
        }
    }

    // Check for ``` ... ``` blocks
    if let Some(start) = trimmed.find("```") {
        if let Some(end) = trimmed[start + 3..].find("```") {
            let content = trimmed[start + 3..start + 3 + end].trim();
            // Skip language identifier if present
            if let Some(newline) = content.find('\n') {
                let first_line = &content[..newline];
                if !first_line.starts_with('{') {
                    return content[newline + 1..].trim();
                }
            }
            return content;
        }
    }

    // Outermost braces, when the model wraps the object in prose
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
