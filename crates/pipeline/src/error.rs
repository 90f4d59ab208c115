use bookhound_core::error::CoreError;
use bookhound_core::types::RequestId;
use bookhound_db::models::status::DownloadStatus;

/// Errors returned by [`DownloadPipeline`](crate::DownloadPipeline) operations.
///
/// Failures inside a running request are not surfaced here; they are
/// recorded on the request row.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Download request {0} not found")]
    NotFound(RequestId),

    #[error("Download {request_id} cannot be cancelled in status '{status}'")]
    NotCancellable {
        request_id: RequestId,
        status: DownloadStatus,
    },

    #[error("Only failed downloads can be retried (current status: '{status}')")]
    NotRetryable {
        request_id: RequestId,
        status: DownloadStatus,
    },

    #[error("No seeding record for download request {0}")]
    NoSeedingRecord(RequestId),

    #[error("Seeding obligation not yet met for download request {0}")]
    SeedingIncomplete(RequestId),

    #[error("Torrent for download request {0} was already removed")]
    AlreadyRemoved(RequestId),

    /// The torrent daemon refused or failed an explicit operation.
    #[error("Download client error: {0}")]
    Daemon(String),

    /// The pipeline is shutting down and accepts no new work.
    #[error("Download pipeline is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
