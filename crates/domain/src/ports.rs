//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{
    CandidateId, CandidatePost, CycleRecord, MatchResult, PostStatus, StatusCounts, TrendSnapshot,
};

/// Errors whose retryability the orchestrator interprets
pub trait Transient {
    /// Whether retrying the same call may succeed
    fn is_transient(&self) -> bool;
}

/// Error type for queue store operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Post {0} not found")]
    NotFound(CandidateId),
    #[error("Post {id} is {status}, expected QUEUED")]
    Conflict { id: CandidateId, status: PostStatus },
    #[error("Queue is full ({max} posts queued)")]
    QueueFull { max: usize },
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable, ordered store of candidate posts plus the cycle log.
///
/// Every mutation is atomic per id. `mark_posted` and `mark_failed` only
/// succeed while the candidate is still `QUEUED`; the first writer wins and
/// later writers observe [`QueueError::Conflict`].
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Validate and append a new `QUEUED` candidate
    async fn enqueue(&self, text: &str, priority: i32) -> Result<CandidatePost, QueueError>;

    /// Fetch a single candidate by id
    async fn get(&self, id: CandidateId) -> Result<Option<CandidatePost>, QueueError>;

    /// List candidates in queue order, optionally filtered by status
    async fn list(&self, status: Option<PostStatus>) -> Result<Vec<CandidatePost>, QueueError>;

    /// Transition a `QUEUED` candidate to `REMOVED`.
    ///
    /// Absent and terminal ids both fail with [`QueueError::NotFound`].
    async fn remove(&self, id: CandidateId) -> Result<(), QueueError>;

    /// Transition `QUEUED -> POSTED`, storing the winning match as provenance
    async fn mark_posted(
        &self,
        id: CandidateId,
        external_post_id: &str,
        provenance: &MatchResult,
    ) -> Result<(), QueueError>;

    /// Transition `QUEUED -> FAILED`
    async fn mark_failed(&self, id: CandidateId, reason: &str) -> Result<(), QueueError>;

    /// Number of candidates per status
    async fn counts(&self) -> Result<StatusCounts, QueueError>;

    /// Most recently posted candidates, newest first
    async fn recent_posted(&self, limit: usize) -> Result<Vec<CandidatePost>, QueueError>;

    /// Append a finished cycle to the log
    async fn append_cycle(&self, record: &CycleRecord) -> Result<(), QueueError>;

    /// Most recent cycle, if any has run
    async fn latest_cycle(&self) -> Result<Option<CycleRecord>, QueueError>;
}

/// Error type for trend source operations
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status} from {source_name}")]
    Http { source_name: String, status: u16 },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No trends found")]
    Empty,
    #[error("Timeout")]
    Timeout,
}

impl Transient for ScrapeError {
    fn is_transient(&self) -> bool {
        // Every scrape failure is worth another attempt; pages change and
        // upstreams flap.
        true
    }
}

/// Port for fetching the current trending topics
#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Fetch a fresh snapshot. Performs no retries of its own.
    async fn fetch(&self) -> Result<TrendSnapshot, ScrapeError>;
}

/// Error type for text-completion providers
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("LLM API error: {0}")]
    Api(String),
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Timeout")]
    Timeout,
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Port for a single LLM text-completion call
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send one prompt and return the raw completion text
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Provider name for logs and status output
    fn name(&self) -> &str;
}

/// Error type for matcher operations
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Provider error: {0}")]
    Provider(#[from] CompletionError),
    #[error("Could not parse match results: {0}")]
    Parse(String),
    #[error("Matching timed out")]
    Timeout,
}

/// Port for scoring candidates against a trend snapshot
#[async_trait]
pub trait Matcher: Send + Sync {
    /// Score every candidate; returns exactly one result per candidate, in
    /// candidate order
    async fn score(
        &self,
        snapshot: &TrendSnapshot,
        candidates: &[CandidatePost],
    ) -> Result<Vec<MatchResult>, MatchError>;
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Rate limited")]
    RateLimited,
    #[error("Timeout")]
    Timeout,
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Content rejected: {0}")]
    Rejected(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Content too long: {len} > {max}")]
    ContentTooLong { len: usize, max: usize },
    /// Accepted by the platform but the reply could not be read; the post
    /// may be live
    #[error("Publish unconfirmed, post may be live: {0}")]
    Unconfirmed(String),
}

impl Transient for PublishError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            PublishError::RateLimited
                | PublishError::Timeout
                | PublishError::Unavailable(_)
                | PublishError::Network(_)
        )
    }
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Platform-specific post ID
    pub id: String,
    /// URL to the published content, if available
    pub url: Option<String>,
}

/// Port for publishing a post
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish text, returning the external post id
    async fn publish(&self, text: &str) -> Result<PublishResult, PublishError>;

    /// Get the platform name (e.g., "x")
    fn platform(&self) -> &'static str;
}

/// Error type for notifier operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("No destination to report to")]
    NoDestination,
}

/// Port for delivering cycle reports. Best effort: callers log and swallow
/// failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn report(&self, record: &CycleRecord) -> Result<(), NotifyError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
