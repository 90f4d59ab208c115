//! Repository for the `download_requests` table.
//!
//! Every status write is conditional on the row's current status (the
//! legal predecessors of the target status), so a row that was cancelled
//! out from under a running task is never overwritten. Methods return
//! `false` when the guard did not match.

use std::collections::BTreeMap;

use bookhound_core::acquisition::{ACTIVE_STATUSES, ALL_STATUSES};
use bookhound_core::types::RequestId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::download_request::{
    CreateDownloadRequest, DownloadRequest, DownloadStats, ProgressUpdate,
};
use crate::models::status::{status_ids, DownloadStatus, StatusId};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, request_id, title, author, search_query, user_agent, \
    ip_address, status_id, mam_torrent_id, torrent_url, search_results, \
    daemon_session_id, daemon_hash, progress, download_rate, upload_rate, eta, \
    file_size, file_path, file_format, error_message, retry_count, created_at, \
    searched_at, started_at, completed_at, updated_at";

/// Provides creation, lookup, and guarded status transitions for download requests.
pub struct DownloadRequestRepo;

impl DownloadRequestRepo {
    /// Insert a new request in the `initiated` status. Returns the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateDownloadRequest,
    ) -> Result<DownloadRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO download_requests
                (request_id, title, author, search_query, user_agent, ip_address, status_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DownloadRequest>(&query)
            .bind(Uuid::new_v4())
            .bind(&input.title)
            .bind(&input.author)
            .bind(&input.search_query)
            .bind(&input.user_agent)
            .bind(&input.ip_address)
            .bind(DownloadStatus::Initiated.id())
            .fetch_one(pool)
            .await
    }

    /// Find a request by its public ID.
    pub async fn find_by_request_id(
        pool: &PgPool,
        request_id: RequestId,
    ) -> Result<Option<DownloadRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM download_requests WHERE request_id = $1");
        sqlx::query_as::<_, DownloadRequest>(&query)
            .bind(request_id)
            .fetch_optional(pool)
            .await
    }

    /// Return just the current status of a request.
    pub async fn current_status(
        pool: &PgPool,
        request_id: RequestId,
    ) -> Result<Option<DownloadStatus>, sqlx::Error> {
        let row: Option<(StatusId,)> =
            sqlx::query_as("SELECT status_id FROM download_requests WHERE request_id = $1")
                .bind(request_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.and_then(|(id,)| DownloadStatus::from_id(id)))
    }

    /// List requests newest first, optionally filtered by status.
    pub async fn list(
        pool: &PgPool,
        status: Option<DownloadStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DownloadRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM download_requests \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, DownloadRequest>(&query)
            .bind(status.map(DownloadStatus::id))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Count requests, optionally filtered by status.
    pub async fn count(pool: &PgPool, status: Option<DownloadStatus>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM download_requests \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1)",
        )
        .bind(status.map(DownloadStatus::id))
        .fetch_one(pool)
        .await
    }

    /// List requests in any of the given statuses, oldest first.
    pub async fn list_by_statuses(
        pool: &PgPool,
        statuses: &[DownloadStatus],
    ) -> Result<Vec<DownloadRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM download_requests \
             WHERE status_id = ANY($1) ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, DownloadRequest>(&query)
            .bind(status_ids(statuses))
            .fetch_all(pool)
            .await
    }

    /// List requests a background task is currently working on.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<DownloadRequest>, sqlx::Error> {
        Self::list_by_statuses(pool, ACTIVE_STATUSES).await
    }

    // ---- guarded transitions ----

    /// `initiated -> searching`.
    pub async fn mark_searching(pool: &PgPool, request_id: RequestId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET status_id = $2 \
             WHERE request_id = $1 AND status_id = ANY($3)",
        )
        .bind(request_id)
        .bind(DownloadStatus::Searching.id())
        .bind(predecessor_ids(DownloadStatus::Searching))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the serialized candidate snapshot and stamp `searched_at`.
    pub async fn record_search_results(
        pool: &PgPool,
        request_id: RequestId,
        search_results: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET search_results = $2, searched_at = NOW() \
             WHERE request_id = $1 AND status_id = $3",
        )
        .bind(request_id)
        .bind(search_results)
        .bind(DownloadStatus::Searching.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `searching -> found`, recording the selected tracker torrent.
    pub async fn mark_found(
        pool: &PgPool,
        request_id: RequestId,
        mam_torrent_id: &str,
        torrent_url: &str,
        file_size: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET \
                status_id = $2, \
                mam_torrent_id = $3, \
                torrent_url = $4, \
                file_size = COALESCE($5, file_size) \
             WHERE request_id = $1 AND status_id = ANY($6)",
        )
        .bind(request_id)
        .bind(DownloadStatus::Found.id())
        .bind(mam_torrent_id)
        .bind(torrent_url)
        .bind(file_size)
        .bind(predecessor_ids(DownloadStatus::Found))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `found -> downloading`, recording the daemon linkage.
    pub async fn mark_downloading(
        pool: &PgPool,
        request_id: RequestId,
        daemon_session_id: i64,
        daemon_hash: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET \
                status_id = $2, \
                daemon_session_id = $3, \
                daemon_hash = COALESCE($4, daemon_hash), \
                started_at = NOW() \
             WHERE request_id = $1 AND status_id = ANY($5)",
        )
        .bind(request_id)
        .bind(DownloadStatus::Downloading.id())
        .bind(daemon_session_id)
        .bind(daemon_hash)
        .bind(predecessor_ids(DownloadStatus::Downloading))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist a progress snapshot while the request is `downloading`.
    pub async fn update_progress(
        pool: &PgPool,
        request_id: RequestId,
        update: &ProgressUpdate,
        daemon_hash: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET \
                progress = $2, \
                download_rate = $3, \
                upload_rate = $4, \
                eta = $5, \
                file_size = COALESCE($6, file_size), \
                daemon_hash = COALESCE($7, daemon_hash) \
             WHERE request_id = $1 AND status_id = $8",
        )
        .bind(request_id)
        .bind(update.progress.clamp(0.0, 100.0))
        .bind(update.download_rate)
        .bind(update.upload_rate)
        .bind(update.eta)
        .bind(update.file_size)
        .bind(daemon_hash)
        .bind(DownloadStatus::Downloading.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `downloading -> completed`, recording the located ebook (if any).
    pub async fn mark_completed(
        pool: &PgPool,
        request_id: RequestId,
        file_path: Option<&str>,
        file_format: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET \
                status_id = $2, \
                progress = 100, \
                download_rate = 0, \
                eta = NULL, \
                file_path = $3, \
                file_format = $4, \
                completed_at = NOW() \
             WHERE request_id = $1 AND status_id = ANY($5)",
        )
        .bind(request_id)
        .bind(DownloadStatus::Completed.id())
        .bind(file_path)
        .bind(file_format)
        .bind(predecessor_ids(DownloadStatus::Completed))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a non-terminal request to `failed` with a human-readable reason.
    pub async fn mark_failed(
        pool: &PgPool,
        request_id: RequestId,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET status_id = $2, error_message = $3 \
             WHERE request_id = $1 AND status_id = ANY($4)",
        )
        .bind(request_id)
        .bind(DownloadStatus::Failed.id())
        .bind(error_message)
        .bind(predecessor_ids(DownloadStatus::Failed))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move an active request to `cancelled`.
    pub async fn mark_cancelled(pool: &PgPool, request_id: RequestId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET status_id = $2 \
             WHERE request_id = $1 AND status_id = ANY($3)",
        )
        .bind(request_id)
        .bind(DownloadStatus::Cancelled.id())
        .bind(predecessor_ids(DownloadStatus::Cancelled))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `failed -> initiated`: bump `retry_count`, clear the error and every
    /// field the previous attempt produced.
    pub async fn reset_for_retry(pool: &PgPool, request_id: RequestId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE download_requests SET \
                status_id = $2, \
                retry_count = retry_count + 1, \
                error_message = NULL, \
                mam_torrent_id = NULL, \
                torrent_url = NULL, \
                search_results = '[]'::jsonb, \
                daemon_session_id = NULL, \
                daemon_hash = NULL, \
                progress = 0, \
                download_rate = NULL, \
                upload_rate = NULL, \
                eta = NULL, \
                file_size = NULL, \
                file_path = NULL, \
                file_format = NULL, \
                searched_at = NULL, \
                started_at = NULL, \
                completed_at = NULL \
             WHERE request_id = $1 AND status_id = ANY($3)",
        )
        .bind(request_id)
        .bind(DownloadStatus::Initiated.id())
        .bind(predecessor_ids(DownloadStatus::Initiated))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- aggregates ----

    /// Counts by status, 24h volume, and overall success rate.
    pub async fn stats(pool: &PgPool) -> Result<DownloadStats, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> = sqlx::query_as(
            "SELECT status_id, COUNT(*) FROM download_requests GROUP BY status_id",
        )
        .fetch_all(pool)
        .await?;

        let mut by_status: BTreeMap<String, i64> = ALL_STATUSES
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for (status_id, count) in rows {
            if let Some(status) = DownloadStatus::from_id(status_id) {
                by_status.insert(status.as_str().to_string(), count);
            }
        }

        let (last_24h, completed_last_24h): (i64, i64) = sqlx::query_as(
            "SELECT \
                COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '24 hours'), \
                COUNT(*) FILTER (WHERE status_id = $1 AND completed_at > NOW() - INTERVAL '24 hours') \
             FROM download_requests",
        )
        .bind(DownloadStatus::Completed.id())
        .fetch_one(pool)
        .await?;

        let total = by_status.values().sum();
        let completed = by_status[DownloadStatus::Completed.as_str()];
        let failed = by_status[DownloadStatus::Failed.as_str()];

        Ok(DownloadStats {
            by_status,
            total,
            last_24h,
            completed_last_24h,
            success_rate: success_rate(completed, failed),
        })
    }
}

fn predecessor_ids(next: DownloadStatus) -> Vec<StatusId> {
    status_ids(&DownloadStatus::predecessors(next))
}

/// Percentage of finished requests that completed, rounded to one decimal.
fn success_rate(completed: i64, failed: i64) -> f64 {
    let finished = completed + failed;
    if finished == 0 {
        return 0.0;
    }
    ((completed as f64 / finished as f64) * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_handles_no_finished_requests() {
        assert_eq!(success_rate(0, 0), 0.0);
    }

    #[test]
    fn success_rate_rounds_to_one_decimal() {
        assert_eq!(success_rate(2, 1), 66.7);
        assert_eq!(success_rate(3, 0), 100.0);
    }

    #[test]
    fn cancel_guard_only_matches_active_statuses() {
        let ids = predecessor_ids(DownloadStatus::Cancelled);
        assert_eq!(ids, status_ids(ACTIVE_STATUSES));
    }
}
