//! Download request entity model and DTOs.

use bookhound_core::types::{DbId, RequestId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::status::{serialize_status, DownloadStatus, StatusId};

/// A row from the `download_requests` table.
///
/// Serialized as the full status object returned by the status endpoint;
/// `status_id` is rendered as the status name under the `status` key.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DownloadRequest {
    #[serde(skip)]
    pub id: DbId,
    pub request_id: RequestId,
    pub title: String,
    pub author: String,
    pub search_query: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    #[serde(rename = "status", serialize_with = "serialize_status")]
    pub status_id: StatusId,
    pub mam_torrent_id: Option<String>,
    pub torrent_url: Option<String>,
    pub search_results: serde_json::Value,
    pub daemon_session_id: Option<i64>,
    pub daemon_hash: Option<String>,
    pub progress: f64,
    pub download_rate: Option<i64>,
    pub upload_rate: Option<i64>,
    pub eta: Option<i64>,
    pub file_size: Option<i64>,
    pub file_path: Option<String>,
    pub file_format: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: Timestamp,
    pub searched_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl DownloadRequest {
    /// Decoded lifecycle status. `None` only if the lookup table and the
    /// enum have drifted apart.
    pub fn status(&self) -> Option<DownloadStatus> {
        DownloadStatus::from_id(self.status_id)
    }
}

/// DTO for inserting a new download request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDownloadRequest {
    pub title: String,
    pub author: String,
    pub search_query: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Progress snapshot written on every monitor poll.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    /// Percentage, 0 - 100.
    pub progress: f64,
    pub download_rate: Option<i64>,
    pub upload_rate: Option<i64>,
    pub eta: Option<i64>,
    pub file_size: Option<i64>,
}

/// Request counts returned by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadStats {
    /// Count of requests per status name (every status present, zero if none).
    pub by_status: std::collections::BTreeMap<String, i64>,
    pub total: i64,
    /// Requests created in the last 24 hours.
    pub last_24h: i64,
    /// Requests completed in the last 24 hours.
    pub completed_last_24h: i64,
    /// `completed / (completed + failed)` as a percentage; 0 when neither.
    pub success_rate: f64,
}
