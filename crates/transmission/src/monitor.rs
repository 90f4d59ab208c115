//! Progress monitoring loop.
//!
//! Polls a torrent at a fixed interval and hands each fresh status to a
//! [`ProgressObserver`] until the torrent completes, the daemon reports an
//! error, the observer asks to stop, or the [`CancellationToken`] fires.
//! Tracker warnings are logged and polling continues.
//! Reported progress never decreases within one run.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TransmissionError;
use crate::status::TorrentStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_UNREACHABLE: u32 = 10;

/// Something that can report a torrent's status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// `Ok(None)` means the daemon no longer knows the torrent.
    async fn fetch_status(&self, id: i64) -> Result<Option<TorrentStatus>, TransmissionError>;
}

/// Receives every status snapshot seen by [`monitor`].
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    /// Return `false` to stop monitoring.
    async fn on_progress(&self, status: &TorrentStatus) -> bool;
}

/// Tunables for [`monitor`].
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    /// Consecutive failed polls tolerated before giving up.
    pub max_unreachable: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_unreachable: DEFAULT_MAX_UNREACHABLE,
        }
    }
}

/// Why the monitor returned.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEnd {
    /// 100% and seeding (or waiting to seed).
    Completed,
    /// The daemon flagged the torrent with an error.
    DaemonError(String),
    /// The torrent disappeared from the daemon.
    Removed,
    /// Too many consecutive polls failed.
    Unreachable,
    /// The observer returned `false`.
    Stopped,
    Cancelled,
}

/// Result of a monitor run.
#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub end: MonitorEnd,
    /// Last status seen, with progress clamped to the run's maximum.
    pub last: Option<TorrentStatus>,
}

impl MonitorOutcome {
    fn new(end: MonitorEnd, last: Option<TorrentStatus>) -> Self {
        Self { end, last }
    }

    /// The run ended with a complete download.
    pub fn is_complete(&self) -> bool {
        self.end == MonitorEnd::Completed
            && self.last.as_ref().is_some_and(|s| s.progress >= 1.0)
    }
}

/// Poll torrent `id` on `source` until it finishes.
pub async fn monitor<S>(
    source: &S,
    id: i64,
    observer: &dyn ProgressObserver,
    options: &MonitorOptions,
    cancel: &CancellationToken,
) -> MonitorOutcome
where
    S: StatusSource + ?Sized,
{
    let mut last: Option<TorrentStatus> = None;
    let mut failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            tracing::info!(torrent_id = id, "Monitor cancelled");
            return MonitorOutcome::new(MonitorEnd::Cancelled, last);
        }

        let polled = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(torrent_id = id, "Monitor cancelled");
                return MonitorOutcome::new(MonitorEnd::Cancelled, last);
            }
            polled = source.fetch_status(id) => polled,
        };

        match polled {
            Ok(Some(mut status)) => {
                failures = 0;
                if let Some(prev) = &last {
                    status.progress = status.progress.max(prev.progress);
                }

                let keep_going = observer.on_progress(&status).await;
                if status.has_warning() {
                    tracing::warn!(torrent_id = id, warning = %status.error_string, "Tracker warning");
                }
                let error = status.error_message();
                let complete = status.is_complete();
                last = Some(status);

                if !keep_going {
                    tracing::info!(torrent_id = id, "Monitor stopped by observer");
                    return MonitorOutcome::new(MonitorEnd::Stopped, last);
                }
                if let Some(message) = error {
                    tracing::warn!(torrent_id = id, error = %message, "Daemon reported torrent error");
                    return MonitorOutcome::new(MonitorEnd::DaemonError(message), last);
                }
                if complete {
                    tracing::info!(torrent_id = id, "Torrent download complete");
                    return MonitorOutcome::new(MonitorEnd::Completed, last);
                }
            }
            Ok(None) => {
                tracing::warn!(torrent_id = id, "Torrent no longer present in daemon");
                return MonitorOutcome::new(MonitorEnd::Removed, last);
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    torrent_id = id,
                    error = %e,
                    failures,
                    max = options.max_unreachable,
                    "Status poll failed",
                );
                if failures >= options.max_unreachable {
                    return MonitorOutcome::new(MonitorEnd::Unreachable, last);
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(torrent_id = id, "Monitor cancelled");
                return MonitorOutcome::new(MonitorEnd::Cancelled, last);
            }
            _ = tokio::time::sleep(options.poll_interval) => {}
        }
    }
}
