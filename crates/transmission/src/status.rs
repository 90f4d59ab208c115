//! Typed torrent status as reported by `torrent-get`.

use bookhound_core::acquisition::percent_from_fraction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Daemon status codes.
pub const STATUS_STOPPED: i64 = 0;
pub const STATUS_CHECK_WAIT: i64 = 1;
pub const STATUS_CHECKING: i64 = 2;
pub const STATUS_DOWNLOAD_WAIT: i64 = 3;
pub const STATUS_DOWNLOADING: i64 = 4;
pub const STATUS_SEED_WAIT: i64 = 5;
pub const STATUS_SEEDING: i64 = 6;

/// Daemon error codes, reported in `error`.
pub const ERROR_NONE: i64 = 0;
/// The tracker returned a warning; the transfer carries on.
pub const ERROR_TRACKER_WARNING: i64 = 1;
pub const ERROR_TRACKER_ERROR: i64 = 2;
/// Local failure such as missing data or a full disk.
pub const ERROR_LOCAL: i64 = 3;

/// Fields requested from `torrent-get`.
pub const STATUS_FIELDS: &[&str] = &[
    "id",
    "hashString",
    "name",
    "status",
    "percentDone",
    "rateDownload",
    "rateUpload",
    "eta",
    "totalSize",
    "downloadedEver",
    "uploadedEver",
    "uploadRatio",
    "peersConnected",
    "peersSendingToUs",
    "peersGettingFromUs",
    "error",
    "errorString",
    "downloadDir",
    "files",
    "addedDate",
    "doneDate",
];

/// Human-readable label for a daemon status code.
pub fn status_label(code: i64) -> &'static str {
    match code {
        STATUS_STOPPED => "stopped",
        STATUS_CHECK_WAIT => "check pending",
        STATUS_CHECKING => "checking",
        STATUS_DOWNLOAD_WAIT => "download pending",
        STATUS_DOWNLOADING => "downloading",
        STATUS_SEED_WAIT => "seed pending",
        STATUS_SEEDING => "seeding",
        _ => "unknown",
    }
}

/// One file inside a torrent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TorrentFile {
    /// Path relative to the torrent's download directory.
    pub name: String,
    pub length: i64,
    pub bytes_completed: i64,
}

/// Snapshot of a torrent, decoded from the daemon's camelCase fields.
///
/// Missing fields default to zero/empty so older daemons still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentStatus {
    pub id: i64,
    #[serde(rename = "hashString")]
    pub hash: String,
    pub name: String,
    #[serde(rename = "status")]
    pub status_code: i64,
    /// Fraction complete, 0.0 - 1.0.
    #[serde(rename = "percentDone")]
    pub progress: f64,
    #[serde(rename = "rateDownload")]
    pub download_rate: i64,
    #[serde(rename = "rateUpload")]
    pub upload_rate: i64,
    /// Seconds remaining; negative when unknown.
    pub eta: i64,
    #[serde(rename = "totalSize")]
    pub total_size: i64,
    #[serde(rename = "downloadedEver")]
    pub downloaded_bytes: i64,
    #[serde(rename = "uploadedEver")]
    pub uploaded_bytes: i64,
    /// Negative when not applicable.
    #[serde(rename = "uploadRatio")]
    pub ratio: f64,
    #[serde(rename = "peersConnected")]
    pub peers: i64,
    #[serde(rename = "peersSendingToUs")]
    pub seeders: i64,
    #[serde(rename = "peersGettingFromUs")]
    pub leechers: i64,
    /// One of the `ERROR_*` codes.
    pub error: i64,
    #[serde(rename = "errorString")]
    pub error_string: String,
    #[serde(rename = "downloadDir")]
    pub download_dir: String,
    pub files: Vec<TorrentFile>,
    /// Unix seconds; 0 when unset.
    #[serde(rename = "addedDate")]
    pub added_date: i64,
    #[serde(rename = "doneDate")]
    pub done_date: i64,
}

impl TorrentStatus {
    pub fn status_label(&self) -> &'static str {
        status_label(self.status_code)
    }

    /// Progress as a percentage, 0 - 100.
    pub fn percent(&self) -> f64 {
        percent_from_fraction(self.progress)
    }

    /// Fully downloaded and handed over to seeding.
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
            && matches!(self.status_code, STATUS_SEED_WAIT | STATUS_SEEDING)
    }

    /// A tracker error or local error. Tracker warnings don't count.
    pub fn has_error(&self) -> bool {
        self.error != ERROR_NONE && self.error != ERROR_TRACKER_WARNING
    }

    pub fn has_warning(&self) -> bool {
        self.error == ERROR_TRACKER_WARNING
    }

    /// Error text, falling back to a generic description of the code.
    pub fn error_message(&self) -> Option<String> {
        if !self.has_error() {
            return None;
        }
        if self.error_string.trim().is_empty() {
            Some(format!("Daemon error code {}", self.error))
        } else {
            Some(self.error_string.clone())
        }
    }

    pub fn eta_secs(&self) -> Option<i64> {
        (self.eta >= 0).then_some(self.eta)
    }

    /// Upload ratio with the daemon's negative sentinels mapped to 0.
    pub fn effective_ratio(&self) -> f64 {
        if self.ratio.is_finite() && self.ratio > 0.0 {
            self.ratio
        } else {
            0.0
        }
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }

    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        unix_to_datetime(self.added_date)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        unix_to_datetime(self.done_date)
    }
}

fn unix_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}
