//! Cycle orchestrator - fetch trends, score the queue, decide, publish, report

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    model::{
        CandidatePost, CycleOutcome, CycleRecord, CycleReport, MatchResult, PostStatus,
        RankedMatch, Trigger,
    },
    policy::{Decision, PolicyGate, PostingWindow},
    ports::{
        Clock, MatchError, Matcher, Notifier, PublishError, PublishResult, Publisher, QueueError,
        QueueStore, ScrapeError, TrendSource,
    },
    retry::RetryPolicy,
};

/// Step the orchestrator is currently executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    FetchingTrends,
    LoadingCandidates,
    Matching,
    Deciding,
    Publishing,
    Reporting,
    Error,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "IDLE",
            CycleState::FetchingTrends => "FETCHING_TRENDS",
            CycleState::LoadingCandidates => "LOADING_CANDIDATES",
            CycleState::Matching => "MATCHING",
            CycleState::Deciding => "DECIDING",
            CycleState::Publishing => "PUBLISHING",
            CycleState::Reporting => "REPORTING",
            CycleState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Posting hours applied to timer-triggered cycles
    pub window: PostingWindow,
    pub min_relevance_score: u8,
    pub scrape_retry: RetryPolicy,
    pub publish_retry: RetryPolicy,
    /// Ceiling per scrape attempt
    pub scrape_timeout: Duration,
    /// Ceiling for the whole matcher call, reformat retry included
    pub match_timeout: Duration,
    /// Ceiling per publish attempt
    pub publish_timeout: Duration,
    /// How many scored candidates to keep in a report's ranking
    pub ranking_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            window: PostingWindow::default(),
            min_relevance_score: 40,
            scrape_retry: RetryPolicy::scrape(),
            publish_retry: RetryPolicy::publish(),
            scrape_timeout: Duration::from_secs(15),
            match_timeout: Duration::from_secs(45),
            publish_timeout: Duration::from_secs(30),
            ranking_size: 5,
        }
    }
}

/// Errors returned to whoever requested a cycle
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("cycle already running")]
    AlreadyRunning,
}

/// Drives one cycle at a time.
///
/// Timer and manual triggers both go through [`Orchestrator::run_cycle`]; a
/// request that arrives while another cycle holds the slot is rejected with
/// [`CycleError::AlreadyRunning`].
pub struct Orchestrator {
    trends: Arc<dyn TrendSource>,
    queue: Arc<dyn QueueStore>,
    matcher: Arc<dyn Matcher>,
    publisher: Arc<dyn Publisher>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    gate: PolicyGate,
    config: OrchestratorConfig,
    slot: Mutex<()>,
    state: watch::Sender<CycleState>,
}

impl Orchestrator {
    pub fn new(
        trends: Arc<dyn TrendSource>,
        queue: Arc<dyn QueueStore>,
        matcher: Arc<dyn Matcher>,
        publisher: Arc<dyn Publisher>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        let (state, _) = watch::channel(CycleState::Idle);
        Self {
            trends,
            queue,
            matcher,
            publisher,
            notifier,
            clock,
            gate: PolicyGate::new(config.min_relevance_score),
            config,
            slot: Mutex::new(()),
            state,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    /// Run one cycle to completion.
    ///
    /// Dry runs stop after the decision and are returned to the caller
    /// without touching the cycle log or the notifier.
    pub async fn run_cycle(&self, trigger: Trigger) -> Result<CycleReport, CycleError> {
        let _slot = self.slot.try_lock().map_err(|_| {
            tracing::info!(trigger = %trigger, "Cycle already running, rejecting trigger");
            CycleError::AlreadyRunning
        })?;
        let _idle = IdleOnDrop(&self.state);

        let cycle_id = Uuid::new_v4();
        let mut draft = Draft::new(cycle_id, trigger, self.clock.now());
        tracing::info!(cycle_id = %cycle_id, trigger = %trigger, "Cycle started");

        let ranking = self
            .execute(&mut draft)
            .instrument(tracing::info_span!("cycle", id = %cycle_id))
            .await;

        self.set_state(CycleState::Reporting);
        let record = draft.finish(self.clock.now());

        tracing::info!(
            cycle_id = %record.id,
            outcome = %record.outcome,
            detail = %record.detail,
            "Cycle finished"
        );

        let dry_run = trigger == Trigger::DryRun;
        if !dry_run {
            if let Err(e) = self.queue.append_cycle(&record).await {
                tracing::error!(cycle_id = %record.id, error = %e, "Failed to record cycle");
            }
            if let Err(e) = self.notifier.report(&record).await {
                tracing::warn!(cycle_id = %record.id, error = %e, "Failed to deliver cycle report");
            }
        }

        Ok(CycleReport {
            record,
            dry_run,
            ranking,
        })
    }

    async fn execute(&self, draft: &mut Draft) -> Vec<RankedMatch> {
        if draft.trigger == Trigger::Timer && !self.config.window.contains(draft.started_at) {
            let window = &self.config.window;
            draft.outcome = CycleOutcome::SkippedWindow;
            draft.detail = format!(
                "outside posting hours [{:02}:00, {:02}:00) {}",
                window.start_hour(),
                window.end_hour(),
                window.timezone()
            );
            return Vec::new();
        }

        self.set_state(CycleState::FetchingTrends);
        let fetched = self
            .config
            .scrape_retry
            .run("scrape", |attempt| async move {
                tracing::debug!(attempt = attempt, "Fetching trends");
                match tokio::time::timeout(self.config.scrape_timeout, self.trends.fetch()).await {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::Timeout),
                }
            })
            .await;
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.fail(draft, format!("trend scrape failed: {}", e));
                return Vec::new();
            }
        };
        tracing::info!(trends = snapshot.len(), "Fetched trends");

        self.set_state(CycleState::LoadingCandidates);
        let candidates = match self.queue.list(Some(PostStatus::Queued)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                self.fail(draft, format!("failed to load queue: {}", e));
                return Vec::new();
            }
        };
        if candidates.is_empty() {
            draft.outcome = CycleOutcome::NoCandidates;
            draft.detail = "queue is empty".to_string();
            return Vec::new();
        }

        self.set_state(CycleState::Matching);
        let scored = match tokio::time::timeout(
            self.config.match_timeout,
            self.matcher.score(&snapshot, &candidates),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MatchError::Timeout),
        };
        let matches = match scored {
            Ok(matches) => matches,
            Err(e) => {
                self.fail(draft, format!("matching failed: {}", e));
                return Vec::new();
            }
        };

        self.set_state(CycleState::Deciding);
        let ranking = rank(&candidates, &matches, self.config.ranking_size);
        let (candidate, matched) = match self.gate.decide(&matches) {
            Decision::NoCandidates => {
                draft.outcome = CycleOutcome::NoCandidates;
                draft.detail = "matcher returned no results".to_string();
                return ranking;
            }
            Decision::NoMatch => {
                let best = matches.iter().map(|m| m.relevance_score).max().unwrap_or(0);
                draft.outcome = CycleOutcome::NoMatch;
                draft.detail = format!(
                    "no candidate reached score {} (best {})",
                    self.gate.min_relevance_score(),
                    best
                );
                return ranking;
            }
            Decision::Publish {
                candidate_id,
                matched,
            } => {
                let Some(candidate) = candidates.iter().find(|c| c.id == candidate_id) else {
                    self.fail(draft, format!("decided on unknown candidate {}", candidate_id));
                    return ranking;
                };
                (candidate.clone(), matched)
            }
        };

        draft.candidate = Some(candidate.clone());
        draft.matched = Some(matched.clone());

        if draft.trigger == Trigger::DryRun {
            draft.outcome = CycleOutcome::Posted;
            draft.detail = format!("would post #{} (dry run)", candidate.id);
            return ranking;
        }

        self.set_state(CycleState::Publishing);
        self.publish(draft, &candidate, &matched).await;
        ranking
    }

    async fn publish(&self, draft: &mut Draft, candidate: &CandidatePost, matched: &MatchResult) {
        tracing::info!(
            candidate_id = candidate.id,
            trend = %matched.trend_topic,
            score = matched.relevance_score,
            "Publishing candidate"
        );

        let published = self
            .config
            .publish_retry
            .run("publish", |attempt| async move {
                tracing::debug!(attempt = attempt, "Publishing");
                match tokio::time::timeout(
                    self.config.publish_timeout,
                    self.publisher.publish(&candidate.text),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(PublishError::Timeout),
                }
            })
            .await;

        match published {
            Ok(PublishResult { id, url }) => {
                match self.queue.mark_posted(candidate.id, &id, matched).await {
                    Ok(()) => {
                        draft.outcome = CycleOutcome::Posted;
                        draft.detail = match url {
                            Some(url) => format!("posted #{} as {} ({})", candidate.id, id, url),
                            None => format!("posted #{} as {}", candidate.id, id),
                        };
                        draft.external_post_id = Some(id);
                    }
                    Err(QueueError::Conflict { status, .. }) => {
                        tracing::warn!(
                            candidate_id = candidate.id,
                            status = %status,
                            "Candidate already transitioned, treating cycle as no-op"
                        );
                        draft.outcome = CycleOutcome::NoMatch;
                        draft.detail = format!(
                            "no-op: #{} was already {} when recording post {}",
                            candidate.id, status, id
                        );
                        draft.external_post_id = Some(id);
                    }
                    Err(e) => {
                        draft.external_post_id = Some(id.clone());
                        self.fail(
                            draft,
                            format!("posted #{} as {} but failed to record it: {}", candidate.id, id, e),
                        );
                    }
                }
            }
            Err(e) => {
                let reason = if e.exhausted() {
                    format!("publish failed after retries: {}", e)
                } else if matches!(e.error, PublishError::Unconfirmed(_)) {
                    format!("publish unconfirmed, check X before requeueing: {}", e)
                } else {
                    format!("publish rejected: {}", e)
                };
                if let Err(mark_err) = self.queue.mark_failed(candidate.id, &reason).await {
                    tracing::error!(
                        candidate_id = candidate.id,
                        error = %mark_err,
                        "Failed to mark candidate as failed"
                    );
                }
                self.fail(draft, reason);
            }
        }
    }

    fn fail(&self, draft: &mut Draft, detail: String) {
        tracing::error!(detail = %detail, "Cycle failed");
        self.set_state(CycleState::Error);
        draft.outcome = CycleOutcome::Error;
        draft.detail = detail;
    }

    fn set_state(&self, state: CycleState) {
        tracing::debug!(state = %state, "Cycle state");
        self.state.send_replace(state);
    }
}

/// Puts the state back to idle however the cycle exits
struct IdleOnDrop<'a>(&'a watch::Sender<CycleState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(CycleState::Idle);
    }
}

/// Cycle record under construction
struct Draft {
    id: Uuid,
    trigger: Trigger,
    started_at: time::OffsetDateTime,
    outcome: CycleOutcome,
    detail: String,
    candidate: Option<CandidatePost>,
    matched: Option<MatchResult>,
    external_post_id: Option<String>,
}

impl Draft {
    fn new(id: Uuid, trigger: Trigger, started_at: time::OffsetDateTime) -> Self {
        Self {
            id,
            trigger,
            started_at,
            outcome: CycleOutcome::Error,
            detail: String::new(),
            candidate: None,
            matched: None,
            external_post_id: None,
        }
    }

    fn finish(self, ended_at: time::OffsetDateTime) -> CycleRecord {
        CycleRecord {
            id: self.id,
            trigger: self.trigger,
            started_at: self.started_at,
            ended_at,
            outcome: self.outcome,
            detail: self.detail,
            candidate_id: self.candidate.as_ref().map(|c| c.id),
            candidate_text: self.candidate.map(|c| c.text),
            matched: self.matched,
            external_post_id: self.external_post_id,
        }
    }
}

/// Pair results with their candidates, best score first; ties keep queue order
fn rank(candidates: &[CandidatePost], matches: &[MatchResult], limit: usize) -> Vec<RankedMatch> {
    let mut ranked: Vec<RankedMatch> = matches
        .iter()
        .filter_map(|m| {
            candidates
                .iter()
                .find(|c| c.id == m.candidate_id)
                .map(|c| RankedMatch {
                    candidate: c.clone(),
                    result: m.clone(),
                })
        })
        .collect();
    ranked.sort_by(|a, b| b.result.relevance_score.cmp(&a.result.relevance_score));
    ranked.truncate(limit);
    ranked
}
