//! Rendering use case - turns cycles, queues and trends into chat-friendly text

use crate::model::{
    CandidatePost, CycleOutcome, CycleRecord, CycleReport, StatusCounts, TrendSnapshot,
};

/// Configuration for the renderer
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Characters of post text shown in lists
    pub preview_chars: usize,
    /// Characters of rationale shown in reports
    pub rationale_chars: usize,
    /// Trends shown by the `trends` command
    pub trends_shown: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            preview_chars: 80,
            rationale_chars: 200,
            trends_shown: 15,
        }
    }
}

/// Static facts about the running service, shown by `status`
#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub provider: String,
    pub check_interval_minutes: u64,
    pub posting_window: String,
    pub min_relevance_score: u8,
    pub auto_post: bool,
}

/// Everything the `status` reply is built from
#[derive(Debug, Clone)]
pub struct StatusView<'a> {
    pub info: Option<&'a StatusInfo>,
    pub cycle_state: Option<String>,
    pub latest: Option<&'a CycleRecord>,
    pub counts: StatusCounts,
    pub recent: &'a [CandidatePost],
}

/// Renderer for human-readable replies and notifications
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Summary of a finished cycle, as delivered by notifiers
    pub fn render_record(&self, record: &CycleRecord) -> String {
        let mut lines = vec![format!(
            "{} Cycle {} ({})",
            outcome_marker(record.outcome),
            record.outcome,
            record.trigger
        )];

        if let Some(text) = &record.candidate_text {
            let id = record
                .candidate_id
                .map(|id| format!("#{} ", id))
                .unwrap_or_default();
            lines.push(format!("Post: {}\"{}\"", id, text));
        }

        if let Some(matched) = &record.matched {
            lines.push(format!(
                "Trend: {} (score {}/100)",
                matched.trend_topic, matched.relevance_score
            ));
            if !matched.rationale.is_empty() {
                lines.push(format!(
                    "Why: {}",
                    truncate_to_length(&matched.rationale, self.config.rationale_chars)
                ));
            }
        }

        if !record.detail.is_empty() {
            lines.push(record.detail.clone());
        }

        lines.join("\n")
    }

    /// Reply for a triggered cycle; dry runs also list the top ranking
    pub fn render_report(&self, report: &CycleReport) -> String {
        if !report.dry_run {
            return self.render_record(&report.record);
        }

        let record = &report.record;
        let mut lines = vec!["Analysis (dry run, nothing was posted)".to_string()];

        match (record.outcome, &record.candidate_text, &record.matched) {
            (CycleOutcome::Posted, Some(text), Some(matched)) => {
                lines.push(format!(
                    "Would post #{}: \"{}\"",
                    matched.candidate_id,
                    truncate_to_length(text, self.config.preview_chars)
                ));
                lines.push(format!(
                    "Trend: {} (score {}/100)",
                    matched.trend_topic, matched.relevance_score
                ));
            }
            (outcome, _, _) => {
                lines.push(format!("Would not post: {} ({})", outcome, record.detail));
            }
        }

        if !report.ranking.is_empty() {
            lines.push(String::new());
            lines.push("Top matches:".to_string());
            for (i, ranked) in report.ranking.iter().enumerate() {
                lines.push(format!(
                    "{}. #{} [{}] {} - {}",
                    i + 1,
                    ranked.candidate.id,
                    ranked.result.relevance_score,
                    truncate_to_length(&ranked.candidate.text, self.config.preview_chars),
                    ranked.result.trend_topic
                ));
            }
        }

        lines.join("\n")
    }

    /// Queue listing in queue order
    pub fn render_queue(&self, posts: &[CandidatePost]) -> String {
        if posts.is_empty() {
            return "Queue is empty.".to_string();
        }

        let mut lines = vec![format!("{} post(s):", posts.len())];
        for post in posts {
            let priority = if post.priority != 0 {
                format!(" p={}", post.priority)
            } else {
                String::new()
            };
            lines.push(format!(
                "#{} [{}{}] {}",
                post.id,
                post.status,
                priority,
                truncate_to_length(&post.text, self.config.preview_chars)
            ));
        }
        lines.join("\n")
    }

    pub fn render_trends(&self, snapshot: &TrendSnapshot) -> String {
        if snapshot.is_empty() {
            return "No trends found.".to_string();
        }

        let mut lines = vec!["Trending now:".to_string()];
        for (i, entry) in snapshot
            .entries()
            .iter()
            .take(self.config.trends_shown)
            .enumerate()
        {
            lines.push(format!("{}. {}", i + 1, entry.topic));
        }
        lines.join("\n")
    }

    pub fn render_status(&self, view: &StatusView<'_>) -> String {
        let mut lines = Vec::new();

        if let Some(state) = &view.cycle_state {
            lines.push(format!("State: {}", state));
        }

        if let Some(info) = view.info {
            lines.push(format!(
                "Provider: {} | every {} min | window {} | min score {} | auto-post {}",
                info.provider,
                info.check_interval_minutes,
                info.posting_window,
                info.min_relevance_score,
                if info.auto_post { "on" } else { "off" }
            ));
        }

        let counts = view.counts;
        lines.push(format!(
            "Queue: {} queued, {} posted, {} failed, {} removed",
            counts.queued, counts.posted, counts.failed, counts.removed
        ));

        match view.latest {
            Some(record) => {
                lines.push(format!(
                    "Last cycle: {} ({}) at {}",
                    record.outcome,
                    record.trigger,
                    format_time(record.ended_at)
                ));
                if !record.detail.is_empty() {
                    lines.push(format!("  {}", record.detail));
                }
            }
            None => lines.push("Last cycle: none yet".to_string()),
        }

        if !view.recent.is_empty() {
            lines.push("Recent posts:".to_string());
            for post in view.recent {
                lines.push(format!(
                    "  #{} {}",
                    post.id,
                    truncate_to_length(&post.text, self.config.preview_chars)
                ));
            }
        }

        lines.join("\n")
    }

    pub fn help_text(&self) -> String {
        [
            "Commands:",
            "queue <text> [p=N]  add a draft post (optional priority N)",
            "list                show queued posts",
            "remove <id>         drop a queued post",
            "trends              show current trending topics",
            "analyze             dry run: show what would be posted",
            "post                run a cycle now (ignores posting hours)",
            "status              last cycle and queue counts",
            "help                this message",
        ]
        .join("\n")
    }
}

fn outcome_marker(outcome: CycleOutcome) -> &'static str {
    match outcome {
        CycleOutcome::Posted => "[posted]",
        CycleOutcome::NoMatch | CycleOutcome::NoCandidates => "[idle]",
        CycleOutcome::SkippedWindow => "[skipped]",
        CycleOutcome::Error => "[error]",
    }
}

fn format_time(at: time::OffsetDateTime) -> String {
    at.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Truncate to `max_len` characters, preserving word boundaries when possible
pub fn truncate_to_length(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        return content.to_string();
    }

    let keep = max_len.saturating_sub(3);
    let cut: String = content.chars().take(keep).collect();
    let break_point = cut.rfind(char::is_whitespace).unwrap_or(cut.len());

    format!("{}...", cut[..break_point].trim_end())
}
