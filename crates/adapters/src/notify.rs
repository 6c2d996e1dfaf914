//! Notifier used when no chat platform is attached

use async_trait::async_trait;
use trendposter_domain::{CycleOutcome, CycleRecord, NotifyError, Notifier};

/// Writes cycle reports to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn report(&self, record: &CycleRecord) -> Result<(), NotifyError> {
        match record.outcome {
            CycleOutcome::Error => tracing::error!(
                cycle_id = %record.id,
                trigger = %record.trigger,
                detail = %record.detail,
                "Cycle failed"
            ),
            outcome => tracing::info!(
                cycle_id = %record.id,
                trigger = %record.trigger,
                outcome = %outcome,
                candidate_id = ?record.candidate_id,
                external_post_id = ?record.external_post_id,
                detail = %record.detail,
                "Cycle report"
            ),
        }
        Ok(())
    }
}
