//! Periodic refresh of seeding obligations.
//!
//! Spawns a background loop that pulls upload stats from the daemon for
//! every seeding record not yet removed, and marks a record complete once
//! the [`SeedingPolicy`](crate::SeedingPolicy) is satisfied.

use std::sync::Arc;

use bookhound_db::repositories::SeedingRecordRepo;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::lifecycle::DownloadPipeline;

/// Outcome of one refresh pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub checked: usize,
    /// Records that became complete during this pass.
    pub newly_complete: usize,
    /// Records the daemon no longer reports.
    pub missing: usize,
}

impl DownloadPipeline {
    /// Refresh every unremoved seeding record once.
    pub async fn refresh_seeding(&self) -> Result<RefreshSummary, PipelineError> {
        let records = SeedingRecordRepo::list_unremoved(self.pool()).await?;
        let policy = &self.config().seeding;
        let mut summary = RefreshSummary::default();

        for record in records {
            let Some(session_id) = record.daemon_session_id else {
                continue;
            };
            let Some(status) = self.daemon().get_status(session_id).await else {
                tracing::debug!(request_id = %record.request_id, session_id, "Seeding torrent not reported by daemon");
                summary.missing += 1;
                continue;
            };

            let ratio = status.effective_ratio();
            let complete = policy.is_satisfied(ratio, record.seeding_started_at, Utc::now());
            SeedingRecordRepo::update_stats(self.pool(), record.id, status.uploaded_bytes, ratio, complete)
                .await?;

            summary.checked += 1;
            if complete && !record.seeding_complete {
                summary.newly_complete += 1;
                tracing::info!(request_id = %record.request_id, ratio, "Seeding obligation met");
            }
        }
        Ok(summary)
    }

    /// Spawn the seeding refresh loop. It stops when the pipeline shuts down.
    pub fn spawn_seeding_monitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pipeline = Arc::clone(self);
        let cancel = self.tasks().child_token();
        tokio::spawn(async move { run(pipeline, cancel).await })
    }
}

/// Run the seeding refresh loop until `cancel` is triggered.
pub async fn run(pipeline: Arc<DownloadPipeline>, cancel: CancellationToken) {
    let check_interval = pipeline.config().seeding.check_interval;
    tracing::info!(interval_secs = check_interval.as_secs(), "Seeding monitor started");

    let mut interval = tokio::time::interval(check_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Seeding monitor stopping");
                break;
            }
            _ = interval.tick() => {
                match pipeline.refresh_seeding().await {
                    Ok(summary) if summary.checked > 0 || summary.missing > 0 => {
                        tracing::info!(
                            checked = summary.checked,
                            newly_complete = summary.newly_complete,
                            missing = summary.missing,
                            "Seeding monitor: refreshed",
                        );
                    }
                    Ok(_) => tracing::debug!("Seeding monitor: nothing to refresh"),
                    Err(e) => tracing::error!(error = %e, "Seeding monitor: refresh failed"),
                }
            }
        }
    }
}
