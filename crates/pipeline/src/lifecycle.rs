//! The per-request download lifecycle.
//!
//! `initiated -> searching -> found -> downloading -> completed`, with
//! `failed` reachable from every non-terminal status and `cancelled` from
//! the active ones. Every write goes through the guarded repository
//! methods, so a request cancelled while its task is mid-step is never
//! overwritten.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bookhound_core::acquisition::{
    build_search_query, locate_ebook_file, no_torrents_message, validate_book_request,
};
use bookhound_core::types::RequestId;
use bookhound_db::models::download_request::{
    CreateDownloadRequest, DownloadRequest, DownloadStats, ProgressUpdate,
};
use bookhound_db::models::seeding_record::{CreateSeedingRecord, SeedingRecord};
use bookhound_db::models::status::DownloadStatus;
use bookhound_db::repositories::{DownloadRequestRepo, SeedingRecordRepo};
use bookhound_transmission::{monitor, MonitorEnd, ProgressObserver, TorrentStatus};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::clients::{TorrentDaemon, TrackerSearch};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::registry::TaskRegistry;

/// Recorded when the tracker rejects the session cookie.
pub const AUTH_FAILED_MESSAGE: &str = "Tracker authentication failed";
pub const METADATA_FAILED_MESSAGE: &str = "Failed to download torrent file";
pub const ADD_FAILED_MESSAGE: &str = "Failed to add torrent to download client";
pub const UNREACHABLE_MESSAGE: &str = "Download client unreachable";
pub const REMOVED_MESSAGE: &str = "Torrent was removed from the download client";
pub const INCOMPLETE_MESSAGE: &str = "Download incomplete";
pub const INTERRUPTED_MESSAGE: &str = "Interrupted by service restart";

/// What [`DownloadPipeline::recover`] did at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Downloads re-attached to a monitor.
    pub reattached: usize,
    /// Requests marked failed because they were interrupted.
    pub failed: usize,
}

/// Orchestrates download requests end to end.
///
/// Created once at startup; the returned `Arc` is cloned into handlers.
pub struct DownloadPipeline {
    pool: PgPool,
    tracker: Arc<dyn TrackerSearch>,
    daemon: Arc<dyn TorrentDaemon>,
    config: PipelineConfig,
    tasks: TaskRegistry,
}

impl DownloadPipeline {
    pub fn new(
        pool: PgPool,
        tracker: Arc<dyn TrackerSearch>,
        daemon: Arc<dyn TorrentDaemon>,
        config: PipelineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            tracker,
            daemon,
            config,
            tasks: TaskRegistry::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn daemon(&self) -> &dyn TorrentDaemon {
        self.daemon.as_ref()
    }

    // ---- commands ----

    /// Create a request for (title, author) and start acquiring it.
    ///
    /// Returns the freshly created row (status `initiated`).
    pub async fn start(
        self: &Arc<Self>,
        title: &str,
        author: &str,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Result<DownloadRequest, PipelineError> {
        if self.tasks.is_shutting_down() {
            return Err(PipelineError::ShuttingDown);
        }
        let (title, author) = validate_book_request(title, author)?;
        let input = CreateDownloadRequest {
            search_query: build_search_query(&title, &author),
            title,
            author,
            user_agent,
            ip_address,
        };
        let request = DownloadRequestRepo::create(&self.pool, &input).await?;

        tracing::info!(
            request_id = %request.request_id,
            title = %request.title,
            author = %request.author,
            "Download request created",
        );
        self.spawn_acquisition(request.request_id).await;
        Ok(request)
    }

    /// Cancel an active request: mark the row, then signal its task.
    pub async fn cancel(&self, request_id: RequestId) -> Result<(), PipelineError> {
        if !DownloadRequestRepo::mark_cancelled(&self.pool, request_id).await? {
            let status = self.require_status(request_id).await?;
            return Err(PipelineError::NotCancellable { request_id, status });
        }
        let signalled = self.tasks.cancel(request_id).await;
        tracing::info!(request_id = %request_id, signalled, "Download cancelled");
        Ok(())
    }

    /// Reset a failed request and run it again.
    pub async fn retry(self: &Arc<Self>, request_id: RequestId) -> Result<(), PipelineError> {
        if self.tasks.is_shutting_down() {
            return Err(PipelineError::ShuttingDown);
        }
        if !DownloadRequestRepo::reset_for_retry(&self.pool, request_id).await? {
            let status = self.require_status(request_id).await?;
            return Err(PipelineError::NotRetryable { request_id, status });
        }
        tracing::info!(request_id = %request_id, "Retrying download");
        self.spawn_acquisition(request_id).await;
        Ok(())
    }

    /// Remove a completed download's torrent and data from the daemon once
    /// its seeding obligation is met.
    pub async fn cleanup(&self, request_id: RequestId) -> Result<SeedingRecord, PipelineError> {
        let record = SeedingRecordRepo::find_by_request_id(&self.pool, request_id)
            .await?
            .ok_or(PipelineError::NoSeedingRecord(request_id))?;
        if record.removed_at.is_some() {
            return Err(PipelineError::AlreadyRemoved(request_id));
        }
        if !record.seeding_complete {
            return Err(PipelineError::SeedingIncomplete(request_id));
        }

        if let Some(session_id) = record.daemon_session_id {
            if !self.daemon.remove(session_id, true).await {
                return Err(PipelineError::Daemon(format!(
                    "failed to remove torrent {session_id}"
                )));
            }
        }
        SeedingRecordRepo::mark_removed(&self.pool, record.id).await?;
        tracing::info!(request_id = %request_id, hash = %record.daemon_hash, "Seeding torrent removed");

        SeedingRecordRepo::find_by_request_id(&self.pool, request_id)
            .await?
            .ok_or(PipelineError::NoSeedingRecord(request_id))
    }

    /// Resume work left behind by a previous process.
    ///
    /// Downloads that reached the daemon are re-attached to a monitor;
    /// anything earlier in the lifecycle is failed so it can be retried.
    pub async fn recover(self: &Arc<Self>) -> Result<RecoveryReport, PipelineError> {
        let mut report = RecoveryReport::default();
        let interrupted = DownloadRequestRepo::list_by_statuses(
            &self.pool,
            &[
                DownloadStatus::Initiated,
                DownloadStatus::Searching,
                DownloadStatus::Found,
                DownloadStatus::Downloading,
            ],
        )
        .await?;

        for request in interrupted {
            let request_id = request.request_id;
            match (request.status(), request.daemon_session_id) {
                (Some(DownloadStatus::Downloading), Some(session_id)) => {
                    let pipeline = Arc::clone(self);
                    self.tasks
                        .spawn(request_id, move |cancel| async move {
                            pipeline.monitor_and_finalize(request_id, session_id, &cancel).await;
                        })
                        .await;
                    report.reattached += 1;
                }
                _ => {
                    if DownloadRequestRepo::mark_failed(&self.pool, request_id, INTERRUPTED_MESSAGE).await? {
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            reattached = report.reattached,
            failed = report.failed,
            "Recovered interrupted downloads",
        );
        Ok(report)
    }

    /// Cancel every running task and wait for them to exit.
    ///
    /// Rows are left as they are; [`recover`](Self::recover) picks them up
    /// on the next start.
    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
    }

    // ---- queries ----

    pub async fn get(&self, request_id: RequestId) -> Result<DownloadRequest, PipelineError> {
        DownloadRequestRepo::find_by_request_id(&self.pool, request_id)
            .await?
            .ok_or(PipelineError::NotFound(request_id))
    }

    /// One page of history plus the total matching count.
    pub async fn history(
        &self,
        status: Option<DownloadStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DownloadRequest>, i64), PipelineError> {
        let items = DownloadRequestRepo::list(&self.pool, status, limit, offset).await?;
        let total = DownloadRequestRepo::count(&self.pool, status).await?;
        Ok((items, total))
    }

    pub async fn active(&self) -> Result<Vec<DownloadRequest>, PipelineError> {
        Ok(DownloadRequestRepo::list_active(&self.pool).await?)
    }

    pub async fn stats(&self) -> Result<DownloadStats, PipelineError> {
        Ok(DownloadRequestRepo::stats(&self.pool).await?)
    }

    pub async fn seeding(&self) -> Result<Vec<SeedingRecord>, PipelineError> {
        Ok(SeedingRecordRepo::list_unremoved(&self.pool).await?)
    }

    // ---- lifecycle ----

    async fn spawn_acquisition(self: &Arc<Self>, request_id: RequestId) {
        let pipeline = Arc::clone(self);
        let spawned = self
            .tasks
            .spawn(request_id, move |cancel| async move {
                pipeline.run(request_id, &cancel).await;
            })
            .await;
        if !spawned {
            tracing::warn!(request_id = %request_id, "Download left in initiated; will fail on restart");
        }
    }

    async fn run(&self, request_id: RequestId, cancel: &CancellationToken) {
        if let Err(e) = self.acquire(request_id, cancel).await {
            tracing::error!(request_id = %request_id, error = %e, "Download task aborted");
            if let Err(e) = DownloadRequestRepo::mark_failed(&self.pool, request_id, &e.to_string()).await {
                tracing::error!(request_id = %request_id, error = %e, "Failed to record task failure");
            }
        }
    }

    /// Search, select, fetch metadata, and hand off to the daemon.
    async fn acquire(&self, request_id: RequestId, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let request = self.get(request_id).await?;

        if !DownloadRequestRepo::mark_searching(&self.pool, request_id).await? {
            tracing::info!(request_id = %request_id, "Request no longer initiated; skipping");
            return Ok(());
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            outcome = self.tracker.search(&request.title, &request.author, self.config.search_limit) => outcome,
        };
        let snapshot = serde_json::to_value(&outcome.candidates)
            .map_err(|e| bookhound_core::error::CoreError::Internal(e.to_string()))?;
        DownloadRequestRepo::record_search_results(&self.pool, request_id, &snapshot).await?;

        let Some(best) = outcome.candidates.first() else {
            let message = if outcome.auth_failed {
                AUTH_FAILED_MESSAGE.to_string()
            } else {
                no_torrents_message(&request.title, &request.author)
            };
            tracing::info!(request_id = %request_id, reason = %message, "No usable candidates");
            DownloadRequestRepo::mark_failed(&self.pool, request_id, &message).await?;
            return Ok(());
        };
        tracing::info!(
            request_id = %request_id,
            torrent_id = %best.id,
            title = %best.title,
            score = best.confidence_score,
            "Selected candidate",
        );

        let metadata_path = self.metadata_path(request_id, &best.id);
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            fetched = self.tracker.fetch_metadata_file(best, &metadata_path) => fetched,
        };
        if !fetched {
            DownloadRequestRepo::mark_failed(&self.pool, request_id, METADATA_FAILED_MESSAGE).await?;
            return Ok(());
        }

        let size = (best.size > 0).then_some(best.size);
        if !DownloadRequestRepo::mark_found(&self.pool, request_id, &best.id, &best.download_url, size).await? {
            tracing::info!(request_id = %request_id, "Request changed during search; stopping");
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Ok(());
        }

        let Some(added) = self.daemon.add(&metadata_path, &self.config.download_dir).await else {
            DownloadRequestRepo::mark_failed(&self.pool, request_id, ADD_FAILED_MESSAGE).await?;
            return Ok(());
        };
        let hash = (!added.hash.is_empty()).then_some(added.hash.as_str());
        if !DownloadRequestRepo::mark_downloading(&self.pool, request_id, added.id, hash).await? {
            tracing::info!(request_id = %request_id, "Request changed before download started");
            return Ok(());
        }
        tracing::info!(request_id = %request_id, torrent_id = added.id, "Download started");

        self.monitor_and_finalize(request_id, added.id, cancel).await;
        Ok(())
    }

    /// Poll the daemon until the torrent finishes, then record the result.
    async fn monitor_and_finalize(&self, request_id: RequestId, session_id: i64, cancel: &CancellationToken) {
        let observer = RowProgress {
            pool: &self.pool,
            request_id,
        };
        let outcome = monitor(self.daemon.as_ref(), session_id, &observer, &self.config.monitor, cancel).await;

        let failure = match (&outcome.end, outcome.last) {
            (MonitorEnd::Completed, Some(last)) if last.progress >= 1.0 => {
                self.finalize(request_id, session_id, last).await;
                return;
            }
            (MonitorEnd::Cancelled | MonitorEnd::Stopped, _) => {
                tracing::info!(request_id = %request_id, end = ?outcome.end, "Monitoring ended");
                return;
            }
            (MonitorEnd::DaemonError(message), _) => format!("Download error: {message}"),
            (MonitorEnd::Unreachable, _) => UNREACHABLE_MESSAGE.to_string(),
            (MonitorEnd::Removed, _) => REMOVED_MESSAGE.to_string(),
            (MonitorEnd::Completed, _) => INCOMPLETE_MESSAGE.to_string(),
        };

        tracing::warn!(request_id = %request_id, reason = %failure, "Download failed");
        if let Err(e) = DownloadRequestRepo::mark_failed(&self.pool, request_id, &failure).await {
            tracing::error!(request_id = %request_id, error = %e, "Failed to record download failure");
        }
    }

    /// Locate the ebook, mark the request completed, and record the
    /// seeding obligation.
    async fn finalize(&self, request_id: RequestId, session_id: i64, status: TorrentStatus) {
        let base_dir = if status.download_dir.is_empty() {
            self.config.download_dir.clone()
        } else {
            PathBuf::from(&status.download_dir)
        };
        let located = {
            let dir = base_dir.clone();
            let name = status.name.clone();
            let files = status.file_names();
            match tokio::task::spawn_blocking(move || locate_ebook_file(&dir, &name, &files)).await {
                Ok(located) => located,
                Err(e) => {
                    tracing::error!(request_id = %request_id, error = %e, "Ebook lookup task failed");
                    None
                }
            }
        };
        if located.is_none() {
            tracing::warn!(
                request_id = %request_id,
                dir = %base_dir.display(),
                "Download complete but no ebook file found",
            );
        }
        let file_path = located.as_ref().map(|(p, _)| p.to_string_lossy().into_owned());
        let file_format = located.as_ref().map(|(_, f)| f.as_str());

        match DownloadRequestRepo::mark_completed(&self.pool, request_id, file_path.as_deref(), file_format).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(request_id = %request_id, "Request changed before completion; not finalizing");
                return;
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to mark download completed");
                return;
            }
        }

        let seeding = CreateSeedingRecord {
            request_id,
            daemon_hash: status.hash.clone(),
            daemon_session_id: Some(session_id),
            total_size: status.total_size,
            uploaded_bytes: status.uploaded_bytes,
            ratio: status.effective_ratio(),
        };
        if let Err(e) = SeedingRecordRepo::create(&self.pool, &seeding).await {
            tracing::error!(request_id = %request_id, error = %e, "Failed to create seeding record");
        }

        tracing::info!(
            request_id = %request_id,
            file_path = file_path.as_deref().unwrap_or(""),
            file_format = file_format.unwrap_or(""),
            "Download completed",
        );
    }

    // ---- private helpers ----

    fn metadata_path(&self, request_id: RequestId, torrent_id: &str) -> PathBuf {
        let safe_id: String = torrent_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        self.config
            .torrent_dir
            .join(format!("{request_id}_{safe_id}.torrent"))
    }

    async fn require_status(&self, request_id: RequestId) -> Result<DownloadStatus, PipelineError> {
        DownloadRequestRepo::current_status(&self.pool, request_id)
            .await?
            .ok_or(PipelineError::NotFound(request_id))
    }
}

/// Persists each monitor snapshot onto the request row.
struct RowProgress<'a> {
    pool: &'a PgPool,
    request_id: RequestId,
}

#[async_trait]
impl ProgressObserver for RowProgress<'_> {
    async fn on_progress(&self, status: &TorrentStatus) -> bool {
        let update = ProgressUpdate {
            progress: status.percent(),
            download_rate: Some(status.download_rate),
            upload_rate: Some(status.upload_rate),
            eta: status.eta_secs(),
            file_size: (status.total_size > 0).then_some(status.total_size),
        };
        let hash = (!status.hash.is_empty()).then_some(status.hash.as_str());

        match DownloadRequestRepo::update_progress(self.pool, self.request_id, &update, hash).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::info!(request_id = %self.request_id, "Request no longer downloading; stopping monitor");
                false
            }
            Err(e) => {
                tracing::error!(request_id = %self.request_id, error = %e, "Failed to persist progress");
                false
            }
        }
    }
}
