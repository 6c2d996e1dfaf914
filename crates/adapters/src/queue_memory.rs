//! In-memory queue store for tests and throwaway runs

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use trendposter_domain::{
    CandidateId, CandidatePost, Clock, CycleRecord, MatchResult, PostStatus, QueueError,
    QueueLimits, QueueStore, StatusCounts, SystemClock, validate_post_text,
};

#[derive(Default)]
struct Inner {
    next_id: CandidateId,
    posts: Vec<CandidatePost>,
    cycles: Vec<CycleRecord>,
}

/// In-memory queue store implementation
pub struct InMemoryQueueStore {
    inner: RwLock<Inner>,
    limits: QueueLimits,
    clock: Arc<dyn Clock>,
}

impl InMemoryQueueStore {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            limits,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Apply `update` to a `QUEUED` post under the write lock
    fn transition(
        &self,
        id: CandidateId,
        update: impl FnOnce(&mut CandidatePost),
    ) -> Result<(), QueueError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| QueueError::Database(e.to_string()))?;
        let post = inner
            .posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(QueueError::NotFound(id))?;
        if post.status != PostStatus::Queued {
            return Err(QueueError::Conflict {
                id,
                status: post.status,
            });
        }
        update(post);
        Ok(())
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new(QueueLimits::default())
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, text: &str, priority: i32) -> Result<CandidatePost, QueueError> {
        let text = validate_post_text(text, self.limits.max_chars)?;
        let mut inner = self
            .inner
            .write()
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let queued = inner
            .posts
            .iter()
            .filter(|p| p.status == PostStatus::Queued)
            .count();
        if queued >= self.limits.max_queued {
            return Err(QueueError::QueueFull {
                max: self.limits.max_queued,
            });
        }

        inner.next_id += 1;
        let post = CandidatePost::queued(inner.next_id, text, priority, self.clock.now());
        inner.posts.push(post.clone());
        Ok(post)
    }

    async fn get(&self, id: CandidateId) -> Result<Option<CandidatePost>, QueueError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(inner.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn list(&self, status: Option<PostStatus>) -> Result<Vec<CandidatePost>, QueueError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| QueueError::Database(e.to_string()))?;
        let mut posts: Vec<_> = inner
            .posts
            .iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        posts.sort_by(CandidatePost::queue_order);
        Ok(posts)
    }

    async fn remove(&self, id: CandidateId) -> Result<(), QueueError> {
        self.transition(id, |post| post.status = PostStatus::Removed)
            .map_err(|e| match e {
                QueueError::Conflict { id, .. } => QueueError::NotFound(id),
                other => other,
            })
    }

    async fn mark_posted(
        &self,
        id: CandidateId,
        external_post_id: &str,
        provenance: &MatchResult,
    ) -> Result<(), QueueError> {
        let now = self.clock.now();
        self.transition(id, |post| {
            post.status = PostStatus::Posted;
            post.posted_at = Some(now);
            post.posted_as = Some(external_post_id.to_string());
            post.provenance = Some(provenance.clone());
        })
    }

    async fn mark_failed(&self, id: CandidateId, reason: &str) -> Result<(), QueueError> {
        self.transition(id, |post| {
            post.status = PostStatus::Failed;
            post.failure_reason = Some(reason.to_string());
        })
    }

    async fn counts(&self) -> Result<StatusCounts, QueueError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| QueueError::Database(e.to_string()))?;
        let mut counts = StatusCounts::default();
        for post in &inner.posts {
            counts.add(post.status, 1);
        }
        Ok(counts)
    }

    async fn recent_posted(&self, limit: usize) -> Result<Vec<CandidatePost>, QueueError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| QueueError::Database(e.to_string()))?;
        let mut posted: Vec<_> = inner
            .posts
            .iter()
            .filter(|p| p.status == PostStatus::Posted)
            .cloned()
            .collect();
        posted.sort_by(|a, b| b.posted_at.cmp(&a.posted_at).then(b.id.cmp(&a.id)));
        posted.truncate(limit);
        Ok(posted)
    }

    async fn append_cycle(&self, record: &CycleRecord) -> Result<(), QueueError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| QueueError::Database(e.to_string()))?;
        inner.cycles.push(record.clone());
        Ok(())
    }

    async fn latest_cycle(&self) -> Result<Option<CycleRecord>, QueueError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(inner.cycles.last().cloned())
    }
}
