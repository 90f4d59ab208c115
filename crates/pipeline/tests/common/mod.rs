//! Shared fakes and helpers for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bookhound_core::matching::{rank_candidates, Candidate};
use bookhound_core::types::RequestId;
use bookhound_db::models::download_request::DownloadRequest;
use bookhound_db::models::status::DownloadStatus;
use bookhound_mam::SearchOutcome;
use bookhound_pipeline::{DownloadPipeline, PipelineConfig, TorrentDaemon, TrackerSearch};
use bookhound_transmission::status::ERROR_LOCAL;
use bookhound_transmission::{
    AddedTorrent, MonitorOptions, StatusSource, TorrentFile, TorrentStatus, TransmissionError,
};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Fake tracker
// ---------------------------------------------------------------------------

pub struct FakeTracker {
    pub candidates: Mutex<Vec<Candidate>>,
    pub auth_failed: bool,
    pub fetch_ok: bool,
    /// Never answer a search, so the task stays in `searching`.
    pub hold_search: bool,
    /// Never finish a metadata fetch.
    pub hold_fetch: bool,
    pub searches: AtomicUsize,
}

impl FakeTracker {
    pub fn with(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            auth_failed: false,
            fetch_ok: true,
            hold_search: false,
            hold_fetch: false,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with(Vec::new())
    }
}

#[async_trait]
impl TrackerSearch for FakeTracker {
    async fn search(&self, title: &str, author: &str, limit: usize) -> SearchOutcome {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.hold_search {
            std::future::pending::<()>().await;
        }
        if self.auth_failed {
            return SearchOutcome {
                candidates: Vec::new(),
                auth_failed: true,
            };
        }
        let mut candidates: Vec<Candidate> = self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(|c| c.scored(title, author))
            .collect();
        rank_candidates(&mut candidates);
        candidates.truncate(limit);
        SearchOutcome {
            candidates,
            auth_failed: false,
        }
    }

    async fn fetch_metadata_file(&self, _candidate: &Candidate, destination: &Path) -> bool {
        if self.hold_fetch {
            std::future::pending::<()>().await;
        }
        if !self.fetch_ok {
            return false;
        }
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(destination, b"d4:infod4:name4:Duneee").unwrap();
        true
    }
}

pub fn candidate(id: &str, title: &str, author: &str, seeders: i32) -> Candidate {
    Candidate {
        id: id.to_string(),
        title: title.to_string(),
        author: author.to_string(),
        size: 2048,
        seeders,
        leechers: 0,
        download_url: format!("https://tracker.example/tor/download.php?tid={id}"),
        format: "epub".to_string(),
        category: "Ebooks - Science Fiction".to_string(),
        confidence_score: 0.0,
    }
}

pub fn dune_candidates() -> Vec<Candidate> {
    vec![
        candidate("2", "Dune Messiah", "Frank Herbert", 30),
        candidate("1", "Dune", "Frank Herbert", 50),
    ]
}

// ---------------------------------------------------------------------------
// Fake daemon
// ---------------------------------------------------------------------------

/// Reports scripted progress: the n-th poll of a torrent returns
/// `steps[n]`, repeating the last step forever.
pub struct FakeDaemon {
    pub download_dir: PathBuf,
    pub files: Vec<String>,
    pub steps: Vec<f64>,
    pub add_ok: bool,
    pub error: Option<String>,
    /// Code reported alongside `error`.
    pub error_code: i64,
    pub ratio: Mutex<f64>,
    next_id: AtomicI64,
    polls: Mutex<HashMap<i64, usize>>,
    pub added: Mutex<Vec<PathBuf>>,
    pub removed: Mutex<Vec<(i64, bool)>>,
}

impl FakeDaemon {
    pub fn new(download_dir: &Path, files: &[&str], steps: &[f64]) -> Self {
        Self {
            download_dir: download_dir.to_path_buf(),
            files: files.iter().map(|f| f.to_string()).collect(),
            steps: steps.to_vec(),
            add_ok: true,
            error: None,
            error_code: ERROR_LOCAL,
            ratio: Mutex::new(0.0),
            next_id: AtomicI64::new(0),
            polls: Mutex::new(HashMap::new()),
            added: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    fn status_for(&self, id: i64) -> Option<TorrentStatus> {
        if self.removed.lock().unwrap().iter().any(|(r, _)| *r == id) {
            return None;
        }
        let mut polls = self.polls.lock().unwrap();
        let n = polls.entry(id).or_insert(0);
        let progress = self.steps[(*n).min(self.steps.len() - 1)];
        *n += 1;

        Some(TorrentStatus {
            id,
            hash: format!("hash-{id}"),
            name: "Dune".to_string(),
            status_code: if progress >= 1.0 { 6 } else { 4 },
            progress,
            download_rate: 1000,
            upload_rate: 100,
            eta: 30,
            total_size: 2048,
            uploaded_bytes: 512,
            ratio: *self.ratio.lock().unwrap(),
            error: if self.error.is_some() { self.error_code } else { 0 },
            error_string: self.error.clone().unwrap_or_default(),
            download_dir: self.download_dir.to_string_lossy().into_owned(),
            files: self
                .files
                .iter()
                .map(|name| TorrentFile {
                    name: name.clone(),
                    length: 2048,
                    bytes_completed: 2048,
                })
                .collect(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl StatusSource for FakeDaemon {
    async fn fetch_status(&self, id: i64) -> Result<Option<TorrentStatus>, TransmissionError> {
        Ok(self.status_for(id))
    }
}

#[async_trait]
impl TorrentDaemon for FakeDaemon {
    async fn add(&self, metadata_file: &Path, _download_dir: &Path) -> Option<AddedTorrent> {
        if !self.add_ok {
            return None;
        }
        self.added.lock().unwrap().push(metadata_file.to_path_buf());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Some(AddedTorrent {
            id,
            hash: format!("hash-{id}"),
            name: "Dune".to_string(),
            duplicate: false,
        })
    }

    async fn get_status(&self, id: i64) -> Option<TorrentStatus> {
        self.status_for(id)
    }

    async fn remove(&self, id: i64, delete_files: bool) -> bool {
        self.removed.lock().unwrap().push((id, delete_files));
        true
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pipeline: Arc<DownloadPipeline>,
    pub tracker: Arc<FakeTracker>,
    pub daemon: Arc<FakeDaemon>,
    pub pool: PgPool,
    pub dir: tempfile::TempDir,
}

/// A download directory containing `Dune/Dune.epub`.
pub fn download_dir_with_dune() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("downloads/Dune")).unwrap();
    std::fs::write(dir.path().join("downloads/Dune/Dune.epub"), b"epub").unwrap();
    dir
}

pub fn harness(
    pool: PgPool,
    dir: tempfile::TempDir,
    tracker: FakeTracker,
    make_daemon: impl FnOnce(&Path) -> FakeDaemon,
) -> Harness {
    let download_dir = dir.path().join("downloads");
    std::fs::create_dir_all(&download_dir).unwrap();
    let tracker = Arc::new(tracker);
    let daemon = Arc::new(make_daemon(&download_dir));

    let config = PipelineConfig {
        download_dir,
        torrent_dir: dir.path().join("torrents"),
        monitor: MonitorOptions {
            poll_interval: Duration::from_millis(10),
            max_unreachable: 3,
        },
        ..Default::default()
    };
    let pipeline = DownloadPipeline::new(
        pool.clone(),
        tracker.clone() as Arc<dyn TrackerSearch>,
        daemon.clone() as Arc<dyn TorrentDaemon>,
        config,
    );

    Harness {
        pipeline,
        tracker,
        daemon,
        pool,
        dir,
    }
}

/// Poll until the request reaches `status` and its task has exited.
pub async fn wait_for_status(
    pipeline: &DownloadPipeline,
    request_id: RequestId,
    status: DownloadStatus,
) -> DownloadRequest {
    for _ in 0..500 {
        let row = pipeline.get(request_id).await.unwrap();
        if row.status() == Some(status) && !pipeline.tasks().is_running(request_id).await {
            return row;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let row = pipeline.get(request_id).await.unwrap();
    panic!(
        "request {request_id} never reached {status}; last status {:?}, error {:?}",
        row.status(),
        row.error_message
    );
}

/// Poll until the request reaches `status`, regardless of its task.
pub async fn wait_until(pipeline: &DownloadPipeline, request_id: RequestId, status: DownloadStatus) {
    for _ in 0..500 {
        if pipeline.get(request_id).await.unwrap().status() == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request {request_id} never reached {status}");
}
