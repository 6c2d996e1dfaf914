//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ports::QueueError;

/// Identifier assigned to a candidate when it is queued
pub type CandidateId = i64;

/// Maximum characters the publishing platform accepts in one post
pub const PLATFORM_MAX_CHARS: usize = 280;

/// Lifecycle state of a candidate post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    Queued,
    Posted,
    Failed,
    Removed,
}

impl PostStatus {
    pub const ALL: [PostStatus; 4] = [
        PostStatus::Queued,
        PostStatus::Posted,
        PostStatus::Failed,
        PostStatus::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Queued => "QUEUED",
            PostStatus::Posted => "POSTED",
            PostStatus::Failed => "FAILED",
            PostStatus::Removed => "REMOVED",
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PostStatus::Queued)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(PostStatus::Queued),
            "POSTED" => Ok(PostStatus::Posted),
            "FAILED" => Ok(PostStatus::Failed),
            "REMOVED" => Ok(PostStatus::Removed),
            other => Err(format!("unknown post status: {}", other)),
        }
    }
}

/// A user-submitted draft awaiting a posting decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePost {
    pub id: CandidateId,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Higher wins ties
    pub priority: i32,
    pub status: PostStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub posted_at: Option<OffsetDateTime>,
    /// External post id, set on transition to `POSTED`
    pub posted_as: Option<String>,
    /// Reason recorded on transition to `FAILED`
    pub failure_reason: Option<String>,
    /// Winning match stored alongside a posted candidate
    pub provenance: Option<MatchResult>,
}

impl CandidatePost {
    /// Build a freshly queued candidate
    pub fn queued(id: CandidateId, text: String, priority: i32, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            text,
            created_at,
            priority,
            status: PostStatus::Queued,
            posted_at: None,
            posted_as: None,
            failure_reason: None,
            provenance: None,
        }
    }

    /// Queue order: priority desc, then created_at asc, then id asc.
    ///
    /// The id comparison only matters for candidates created in the same
    /// instant and keeps the order total.
    pub fn queue_order(a: &CandidatePost, b: &CandidatePost) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Validate and normalize draft text before it is queued
pub fn validate_post_text(text: &str, max_chars: usize) -> Result<String, QueueError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(QueueError::Validation("post text is empty".to_string()));
    }

    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(QueueError::Validation(format!(
            "post is too long ({} chars, max {})",
            len, max_chars
        )));
    }

    Ok(trimmed.to_string())
}

/// Limits applied by queue stores on enqueue
#[derive(Debug, Clone, Copy)]
pub struct QueueLimits {
    /// Maximum characters per post
    pub max_chars: usize,
    /// Maximum number of `QUEUED` posts at once
    pub max_queued: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_chars: PLATFORM_MAX_CHARS,
            max_queued: 50,
        }
    }
}

/// Count of candidates per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub posted: u64,
    pub failed: u64,
    pub removed: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: PostStatus, count: u64) {
        match status {
            PostStatus::Queued => self.queued += count,
            PostStatus::Posted => self.posted += count,
            PostStatus::Failed => self.failed += count,
            PostStatus::Removed => self.removed += count,
        }
    }
}

/// One ranked trending topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendEntry {
    pub topic: String,
    /// Post volume when the source reports one, otherwise the 1-based rank
    pub rank_or_volume: f64,
}

impl TrendEntry {
    pub fn new(topic: impl Into<String>, rank_or_volume: f64) -> Self {
        Self {
            topic: topic.into(),
            rank_or_volume,
        }
    }
}

/// Point-in-time capture of ranked trending topics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    #[serde(with = "time::serde::rfc3339")]
    fetched_at: OffsetDateTime,
    entries: Vec<TrendEntry>,
}

impl TrendSnapshot {
    /// Build a snapshot, keeping rank order and dropping blank topics and
    /// case-insensitive duplicates (the first, higher ranked one wins)
    pub fn new(fetched_at: OffsetDateTime, entries: Vec<TrendEntry>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let entries = entries
            .into_iter()
            .filter_map(|entry| {
                let topic = entry.topic.trim().to_string();
                if topic.is_empty() || !seen.insert(topic.to_lowercase()) {
                    return None;
                }
                Some(TrendEntry {
                    topic,
                    rank_or_volume: entry.rank_or_volume,
                })
            })
            .collect();

        Self {
            fetched_at,
            entries,
        }
    }

    /// Keep only the `n` highest ranked entries
    pub fn top(mut self, n: usize) -> Self {
        self.entries.truncate(n);
        self
    }

    pub fn fetched_at(&self) -> OffsetDateTime {
        self.fetched_at
    }

    pub fn entries(&self) -> &[TrendEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Scored pairing of one candidate against the snapshot's trends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate_id: CandidateId,
    pub trend_topic: String,
    /// 0-100
    pub relevance_score: u8,
    pub rationale: String,
}

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Interval timer; subject to the posting-hours window
    Timer,
    /// Manual `post` command; bypasses the window
    Manual,
    /// `analyze` command; never publishes
    DryRun,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Timer => "timer",
            Trigger::Manual => "manual",
            Trigger::DryRun => "dry_run",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timer" => Ok(Trigger::Timer),
            "manual" => Ok(Trigger::Manual),
            "dry_run" => Ok(Trigger::DryRun),
            other => Err(format!("unknown trigger: {}", other)),
        }
    }
}

/// Final outcome of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleOutcome {
    Posted,
    NoMatch,
    NoCandidates,
    SkippedWindow,
    Error,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Posted => "POSTED",
            CycleOutcome::NoMatch => "NO_MATCH",
            CycleOutcome::NoCandidates => "NO_CANDIDATES",
            CycleOutcome::SkippedWindow => "SKIPPED_WINDOW",
            CycleOutcome::Error => "ERROR",
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POSTED" => Ok(CycleOutcome::Posted),
            "NO_MATCH" => Ok(CycleOutcome::NoMatch),
            "NO_CANDIDATES" => Ok(CycleOutcome::NoCandidates),
            "SKIPPED_WINDOW" => Ok(CycleOutcome::SkippedWindow),
            "ERROR" => Ok(CycleOutcome::Error),
            other => Err(format!("unknown cycle outcome: {}", other)),
        }
    }
}

/// Append-only log entry describing one finished cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: Uuid,
    pub trigger: Trigger,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
    pub outcome: CycleOutcome,
    pub detail: String,
    /// Winning (or would-be) candidate
    pub candidate_id: Option<CandidateId>,
    pub candidate_text: Option<String>,
    pub matched: Option<MatchResult>,
    pub external_post_id: Option<String>,
}

/// Candidate paired with its score, for dry-run rankings
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch {
    pub candidate: CandidatePost,
    pub result: MatchResult,
}

/// Result handed back to whoever triggered a cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub record: CycleRecord,
    /// True for `analyze`: the decision was computed but nothing was published
    pub dry_run: bool,
    /// Top scored candidates, best first
    pub ranking: Vec<RankedMatch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_validate_post_text_trims_and_accepts() {
        let text = validate_post_text("  hello world  ", 280).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_validate_post_text_rejects_empty() {
        let result = validate_post_text("   ", 280);
        assert!(matches!(result, Err(QueueError::Validation(_))));
    }

    #[test]
    fn test_validate_post_text_counts_chars_not_bytes() {
        let text = "é".repeat(280);
        assert!(validate_post_text(&text, 280).is_ok());

        let too_long = "é".repeat(281);
        assert!(matches!(
            validate_post_text(&too_long, 280),
            Err(QueueError::Validation(_))
        ));
    }

    #[test]
    fn test_queue_order_priority_then_age() {
        let older = CandidatePost::queued(1, "a".into(), 0, datetime!(2025-01-01 10:00 UTC));
        let newer = CandidatePost::queued(2, "b".into(), 0, datetime!(2025-01-01 11:00 UTC));
        let urgent = CandidatePost::queued(3, "c".into(), 5, datetime!(2025-01-01 12:00 UTC));

        let mut posts = vec![newer.clone(), urgent.clone(), older.clone()];
        posts.sort_by(CandidatePost::queue_order);

        let ids: Vec<_> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_snapshot_drops_duplicate_topics() {
        let snapshot = TrendSnapshot::new(
            datetime!(2025-01-01 10:00 UTC),
            vec![
                TrendEntry::new("Product Launches", 90.0),
                TrendEntry::new("  ", 80.0),
                TrendEntry::new("product launches", 70.0),
                TrendEntry::new("Mondays", 10.0),
            ],
        );

        let topics: Vec<_> = snapshot.entries().iter().map(|e| e.topic.as_str()).collect();
        assert_eq!(topics, vec!["Product Launches", "Mondays"]);
        assert_eq!(snapshot.entries()[0].rank_or_volume, 90.0);
    }

    #[test]
    fn test_status_roundtrip_from_str() {
        for status in PostStatus::ALL {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<PostStatus>().is_err());
    }
}
