//! Status ID helpers for the `download_statuses` lookup table.
//!
//! The state machine itself lives in [`bookhound_core::acquisition`]; this
//! module only bridges it to the SMALLINT column.

use serde::Serializer;

pub use bookhound_core::acquisition::DownloadStatus;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

/// Convert a slice of statuses into the ID array bound to `= ANY($n)`.
pub fn status_ids(statuses: &[DownloadStatus]) -> Vec<StatusId> {
    statuses.iter().map(|s| s.id()).collect()
}

/// Serialize a raw status ID as its lowercase name.
pub fn serialize_status<S: Serializer>(id: &StatusId, serializer: S) -> Result<S::Ok, S::Error> {
    match DownloadStatus::from_id(*id) {
        Some(status) => serializer.serialize_str(status.as_str()),
        None => serializer.serialize_str("unknown"),
    }
}
