//! Query parameter types for API handlers.

use std::str::FromStr;

use bookhound_core::search::{clamp_limit, clamp_offset, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use bookhound_db::models::status::DownloadStatus;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Parameters for `GET /download/history` (`?status=&limit=&offset=`).
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl HistoryQuery {
    /// Parsed status filter. An empty value means no filter.
    pub fn status_filter(&self) -> AppResult<Option<DownloadStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => DownloadStatus::from_str(s)
                .map(Some)
                .map_err(|e| AppError::BadRequest(e.to_string())),
        }
    }

    pub fn limit(&self) -> i64 {
        clamp_limit(self.limit, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        clamp_offset(self.offset)
    }
}
