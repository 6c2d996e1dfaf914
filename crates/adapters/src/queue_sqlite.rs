//! SQLite queue store implementation

use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use trendposter_domain::{
    CandidateId, CandidatePost, Clock, CycleRecord, MatchResult, PostStatus, QueueError,
    QueueLimits, QueueStore, StatusCounts, SystemClock, validate_post_text,
};
use uuid::Uuid;

type CandidateRow = (
    i64,
    String,
    i64,
    i64,
    String,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
);

const CANDIDATE_COLUMNS: &str = "id, text, created_at, priority, status, posted_at, posted_as, failure_reason, provenance";

type CycleRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// SQLite-backed queue store
pub struct SqliteQueueStore {
    pool: SqlitePool,
    limits: QueueLimits,
    clock: Arc<dyn Clock>,
}

impl SqliteQueueStore {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: impl AsRef<Path>, limits: QueueLimits) -> Result<Self, QueueError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QueueError::Database(format!("Failed to create directory: {}", e)))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let store = Self {
            pool,
            limits,
            clock: Arc::new(SystemClock),
        };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory(limits: QueueLimits) -> Result<Self, QueueError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let store = Self {
            pool,
            limits,
            clock: Arc::new(SystemClock),
        };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Replace the clock used for timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn run_migrations(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                posted_at INTEGER,
                posted_as TEXT,
                failure_reason TEXT,
                provenance TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candidates_order
            ON candidates(status, priority DESC, created_at, id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cycle_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                cycle_trigger TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                outcome TEXT NOT NULL,
                detail TEXT NOT NULL,
                candidate_id INTEGER,
                candidate_text TEXT,
                matched TEXT,
                external_post_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(())
    }

    /// Explain why a conditional update touched no rows
    async fn transition_failure(&self, id: CandidateId) -> QueueError {
        let row: Result<Option<(String,)>, _> =
            sqlx::query_as("SELECT status FROM candidates WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match row {
            Ok(Some((status,))) => match status.parse::<PostStatus>() {
                Ok(status) => QueueError::Conflict { id, status },
                Err(e) => QueueError::Serialization(e),
            },
            Ok(None) => QueueError::NotFound(id),
            Err(e) => QueueError::Database(e.to_string()),
        }
    }
}

fn to_nanos(at: OffsetDateTime) -> i64 {
    at.unix_timestamp_nanos() as i64
}

fn from_nanos(nanos: i64) -> Result<OffsetDateTime, QueueError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map_err(|e| QueueError::Serialization(e.to_string()))
}

fn candidate_from_row(row: CandidateRow) -> Result<CandidatePost, QueueError> {
    let (id, text, created_at, priority, status, posted_at, posted_as, failure_reason, provenance) =
        row;

    let provenance = provenance
        .map(|json| serde_json::from_str::<MatchResult>(&json))
        .transpose()
        .map_err(|e| QueueError::Serialization(e.to_string()))?;

    Ok(CandidatePost {
        id,
        text,
        created_at: from_nanos(created_at)?,
        priority: i32::try_from(priority).map_err(|e| QueueError::Serialization(e.to_string()))?,
        status: status.parse().map_err(QueueError::Serialization)?,
        posted_at: posted_at.map(from_nanos).transpose()?,
        posted_as,
        failure_reason,
        provenance,
    })
}

fn cycle_from_row(row: CycleRow) -> Result<CycleRecord, QueueError> {
    let (
        id,
        trigger,
        started_at,
        ended_at,
        outcome,
        detail,
        candidate_id,
        candidate_text,
        matched,
        external_post_id,
    ) = row;

    Ok(CycleRecord {
        id: Uuid::parse_str(&id).map_err(|e| QueueError::Serialization(e.to_string()))?,
        trigger: trigger.parse().map_err(QueueError::Serialization)?,
        started_at: OffsetDateTime::parse(&started_at, &Rfc3339)
            .map_err(|e| QueueError::Serialization(e.to_string()))?,
        ended_at: OffsetDateTime::parse(&ended_at, &Rfc3339)
            .map_err(|e| QueueError::Serialization(e.to_string()))?,
        outcome: outcome.parse().map_err(QueueError::Serialization)?,
        detail,
        candidate_id,
        candidate_text,
        matched: matched
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(|e| QueueError::Serialization(e.to_string()))?,
        external_post_id,
    })
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn enqueue(&self, text: &str, priority: i32) -> Result<CandidatePost, QueueError> {
        let text = validate_post_text(text, self.limits.max_chars)?;
        let created_at = self.clock.now();

        // Capacity check and insert in one statement
        let result = sqlx::query(
            r#"
            INSERT INTO candidates (text, created_at, priority, status)
            SELECT ?, ?, ?, 'QUEUED'
            WHERE (SELECT COUNT(*) FROM candidates WHERE status = 'QUEUED') < ?
            "#,
        )
        .bind(&text)
        .bind(to_nanos(created_at))
        .bind(priority)
        .bind(self.limits.max_queued as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::QueueFull {
                max: self.limits.max_queued,
            });
        }

        let post = CandidatePost::queued(result.last_insert_rowid(), text, priority, created_at);
        tracing::info!(candidate_id = post.id, priority = priority, "Queued post");
        Ok(post)
    }

    async fn get(&self, id: CandidateId) -> Result<Option<CandidatePost>, QueueError> {
        let row: Option<CandidateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM candidates WHERE id = ?",
            CANDIDATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        row.map(candidate_from_row).transpose()
    }

    async fn list(&self, status: Option<PostStatus>) -> Result<Vec<CandidatePost>, QueueError> {
        let rows: Vec<CandidateRow> = match status {
            Some(status) => {
                sqlx::query_as::<_, CandidateRow>(&format!(
                    "SELECT {} FROM candidates WHERE status = ? \
                     ORDER BY priority DESC, created_at ASC, id ASC",
                    CANDIDATE_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, CandidateRow>(&format!(
                    "SELECT {} FROM candidates ORDER BY priority DESC, created_at ASC, id ASC",
                    CANDIDATE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| QueueError::Database(e.to_string()))?;

        rows.into_iter().map(candidate_from_row).collect()
    }

    async fn remove(&self, id: CandidateId) -> Result<(), QueueError> {
        let result =
            sqlx::query("UPDATE candidates SET status = 'REMOVED' WHERE id = ? AND status = 'QUEUED'")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Terminal posts are no longer in the queue
            return match self.transition_failure(id).await {
                QueueError::Conflict { .. } => Err(QueueError::NotFound(id)),
                other => Err(other),
            };
        }

        tracing::info!(candidate_id = id, "Removed post");
        Ok(())
    }

    async fn mark_posted(
        &self,
        id: CandidateId,
        external_post_id: &str,
        provenance: &MatchResult,
    ) -> Result<(), QueueError> {
        let provenance_json = serde_json::to_string(provenance)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET status = 'POSTED', posted_at = ?, posted_as = ?, provenance = ?
            WHERE id = ? AND status = 'QUEUED'
            "#,
        )
        .bind(to_nanos(self.clock.now()))
        .bind(external_post_id)
        .bind(&provenance_json)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_failure(id).await);
        }

        tracing::info!(candidate_id = id, external_post_id = %external_post_id, "Marked posted");
        Ok(())
    }

    async fn mark_failed(&self, id: CandidateId, reason: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE candidates SET status = 'FAILED', failure_reason = ? \
             WHERE id = ? AND status = 'QUEUED'",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_failure(id).await);
        }

        tracing::info!(candidate_id = id, reason = %reason, "Marked failed");
        Ok(())
    }

    async fn counts(&self) -> Result<StatusCounts, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM candidates GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let status: PostStatus = status.parse().map_err(QueueError::Serialization)?;
            counts.add(status, count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn recent_posted(&self, limit: usize) -> Result<Vec<CandidatePost>, QueueError> {
        let rows: Vec<CandidateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM candidates WHERE status = 'POSTED' \
             ORDER BY posted_at DESC, id DESC LIMIT ?",
            CANDIDATE_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        rows.into_iter().map(candidate_from_row).collect()
    }

    async fn append_cycle(&self, record: &CycleRecord) -> Result<(), QueueError> {
        let started_at = record
            .started_at
            .format(&Rfc3339)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let ended_at = record
            .ended_at
            .format(&Rfc3339)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let matched = record
            .matched
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO cycle_records
                (id, cycle_trigger, started_at, ended_at, outcome, detail,
                 candidate_id, candidate_text, matched, external_post_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.trigger.as_str())
        .bind(&started_at)
        .bind(&ended_at)
        .bind(record.outcome.as_str())
        .bind(&record.detail)
        .bind(record.candidate_id)
        .bind(&record.candidate_text)
        .bind(&matched)
        .bind(&record.external_post_id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(())
    }

    async fn latest_cycle(&self) -> Result<Option<CycleRecord>, QueueError> {
        let row: Option<CycleRow> = sqlx::query_as(
            r#"
            SELECT id, cycle_trigger, started_at, ended_at, outcome, detail,
                   candidate_id, candidate_text, matched, external_post_id
            FROM cycle_records
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?;

        row.map(cycle_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::macros::datetime;
    use trendposter_domain::{CycleOutcome, Trigger};

    /// Clock that advances one second per reading
    struct SteppingClock(Mutex<OffsetDateTime>);

    impl Clock for SteppingClock {
        fn now(&self) -> OffsetDateTime {
            let mut now = self.0.lock().unwrap();
            *now += time::Duration::seconds(1);
            *now
        }
    }

    async fn store() -> SqliteQueueStore {
        SqliteQueueStore::in_memory(QueueLimits::default())
            .await
            .unwrap()
            .with_clock(Arc::new(SteppingClock(Mutex::new(datetime!(2025-01-06 09:00 UTC)))))
    }

    fn provenance(id: CandidateId) -> MatchResult {
        MatchResult {
            candidate_id: id,
            trend_topic: "product launches".to_string(),
            relevance_score: 85,
            rationale: "launch".to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_orders_by_priority_then_age() {
        let store = store().await;
        let a = store.enqueue("first, normal", 0).await.unwrap();
        let b = store.enqueue("second, urgent", 5).await.unwrap();
        let c = store.enqueue("third, normal", 0).await.unwrap();
        let d = store.enqueue("fourth, low", -1).await.unwrap();

        let ids: Vec<_> = store
            .list(Some(PostStatus::Queued))
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();

        assert_eq!(ids, vec![b.id, a.id, c.id, d.id]);
    }

    #[tokio::test]
    async fn test_enqueue_validates_text() {
        let store = store().await;

        assert!(matches!(
            store.enqueue("   ", 0).await,
            Err(QueueError::Validation(_))
        ));
        assert!(matches!(
            store.enqueue(&"x".repeat(281), 0).await,
            Err(QueueError::Validation(_))
        ));
        assert!(store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_respects_capacity() {
        let store = SqliteQueueStore::in_memory(QueueLimits {
            max_chars: 280,
            max_queued: 2,
        })
        .await
        .unwrap();

        let first = store.enqueue("one", 0).await.unwrap();
        store.enqueue("two", 0).await.unwrap();
        assert!(matches!(
            store.enqueue("three", 0).await,
            Err(QueueError::QueueFull { max: 2 })
        ));

        // Removing frees a slot
        store.remove(first.id).await.unwrap();
        assert!(store.enqueue("three", 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_terminal_post_is_not_found_and_unchanged() {
        let store = store().await;
        let post = store.enqueue("ship it", 0).await.unwrap();
        store
            .mark_posted(post.id, "99", &provenance(post.id))
            .await
            .unwrap();

        assert!(matches!(
            store.remove(post.id).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(matches!(store.remove(4242).await, Err(QueueError::NotFound(4242))));

        let after = store.get(post.id).await.unwrap().unwrap();
        assert_eq!(after.status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn test_second_remove_fails() {
        let store = store().await;
        let post = store.enqueue("drop me", 0).await.unwrap();

        store.remove(post.id).await.unwrap();
        assert!(matches!(
            store.remove(post.id).await,
            Err(QueueError::NotFound(_))
        ));
        assert_eq!(
            store.get(post.id).await.unwrap().unwrap().status,
            PostStatus::Removed
        );
    }

    #[tokio::test]
    async fn test_mark_posted_is_first_writer_wins() {
        let store = store().await;
        let post = store.enqueue("Just shipped a new feature!", 0).await.unwrap();

        store
            .mark_posted(post.id, "1001", &provenance(post.id))
            .await
            .unwrap();
        let second = store.mark_posted(post.id, "1002", &provenance(post.id)).await;
        assert!(matches!(
            second,
            Err(QueueError::Conflict {
                status: PostStatus::Posted,
                ..
            })
        ));
        assert!(matches!(
            store.mark_failed(post.id, "late").await,
            Err(QueueError::Conflict { .. })
        ));

        let stored = store.get(post.id).await.unwrap().unwrap();
        assert_eq!(stored.posted_as.as_deref(), Some("1001"));
        assert!(stored.posted_at.is_some());
        assert_eq!(stored.provenance, Some(provenance(post.id)));
    }

    #[tokio::test]
    async fn test_mark_failed_records_reason() {
        let store = store().await;
        let post = store.enqueue("too spicy", 0).await.unwrap();

        store.mark_failed(post.id, "content rejected").await.unwrap();

        let stored = store.get(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("content rejected"));
        assert!(matches!(
            store.mark_failed(77, "nope").await,
            Err(QueueError::NotFound(77))
        ));
    }

    #[tokio::test]
    async fn test_counts_and_recent_posted() {
        let store = store().await;
        let a = store.enqueue("a", 0).await.unwrap();
        let b = store.enqueue("b", 0).await.unwrap();
        let c = store.enqueue("c", 0).await.unwrap();
        store.enqueue("d", 0).await.unwrap();
        store.mark_posted(a.id, "1", &provenance(a.id)).await.unwrap();
        store.mark_posted(b.id, "2", &provenance(b.id)).await.unwrap();
        store.remove(c.id).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                queued: 1,
                posted: 2,
                failed: 0,
                removed: 1
            }
        );

        let recent = store.recent_posted(3).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_cycle_log_returns_latest() {
        let store = store().await;
        assert!(store.latest_cycle().await.unwrap().is_none());

        for outcome in [CycleOutcome::NoMatch, CycleOutcome::Posted] {
            let record = CycleRecord {
                id: Uuid::new_v4(),
                trigger: Trigger::Timer,
                started_at: datetime!(2025-01-06 10:00 UTC),
                ended_at: datetime!(2025-01-06 10:01 UTC),
                outcome,
                detail: format!("{}", outcome),
                candidate_id: Some(1),
                candidate_text: Some("text".to_string()),
                matched: Some(provenance(1)),
                external_post_id: None,
            };
            store.append_cycle(&record).await.unwrap();
        }

        let latest = store.latest_cycle().await.unwrap().unwrap();
        assert_eq!(latest.outcome, CycleOutcome::Posted);
        assert_eq!(latest.matched, Some(provenance(1)));
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.db");

        let id = {
            let store = SqliteQueueStore::new(&path, QueueLimits::default())
                .await
                .unwrap();
            store.enqueue("persist me", 2).await.unwrap().id
        };

        let reopened = SqliteQueueStore::new(&path, QueueLimits::default())
            .await
            .unwrap();
        let post = reopened.get(id).await.unwrap().unwrap();
        assert_eq!(post.text, "persist me");
        assert_eq!(post.priority, 2);
        assert_eq!(post.status, PostStatus::Queued);
    }
}
