//! Seams between the pipeline and its external services.
//!
//! The pipeline holds both clients as trait objects so tests can drive it
//! with in-memory fakes.

use std::path::Path;

use async_trait::async_trait;
use bookhound_core::matching::Candidate;
use bookhound_mam::{MamClient, SearchOutcome};
use bookhound_transmission::{AddedTorrent, StatusSource, TorrentStatus, TransmissionClient};

/// Tracker search and metadata download.
#[async_trait]
pub trait TrackerSearch: Send + Sync {
    /// Ranked candidates for the book, best first.
    async fn search(&self, title: &str, author: &str, limit: usize) -> SearchOutcome;

    /// Save the candidate's `.torrent` to `destination`.
    async fn fetch_metadata_file(&self, candidate: &Candidate, destination: &Path) -> bool;
}

/// Torrent daemon control. Status polling comes from [`StatusSource`].
#[async_trait]
pub trait TorrentDaemon: StatusSource {
    async fn add(&self, metadata_file: &Path, download_dir: &Path) -> Option<AddedTorrent>;

    async fn get_status(&self, id: i64) -> Option<TorrentStatus>;

    async fn remove(&self, id: i64, delete_files: bool) -> bool;
}

#[async_trait]
impl TrackerSearch for MamClient {
    async fn search(&self, title: &str, author: &str, limit: usize) -> SearchOutcome {
        self.search_detailed(title, author, limit).await
    }

    async fn fetch_metadata_file(&self, candidate: &Candidate, destination: &Path) -> bool {
        MamClient::fetch_metadata_file(self, candidate, destination).await
    }
}

#[async_trait]
impl TorrentDaemon for TransmissionClient {
    async fn add(&self, metadata_file: &Path, download_dir: &Path) -> Option<AddedTorrent> {
        TransmissionClient::add(self, metadata_file, download_dir).await
    }

    async fn get_status(&self, id: i64) -> Option<TorrentStatus> {
        TransmissionClient::get_status(self, id).await
    }

    async fn remove(&self, id: i64, delete_files: bool) -> bool {
        TransmissionClient::remove(self, id, delete_files).await
    }
}
