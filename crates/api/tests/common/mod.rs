//! Shared app builder, fake clients, and request helpers for API tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use bookhound_api::config::ServerConfig;
use bookhound_api::router::build_app_router;
use bookhound_api::state::AppState;
use bookhound_core::matching::Candidate;
use bookhound_core::types::RequestId;
use bookhound_db::models::status::DownloadStatus;
use bookhound_mam::SearchOutcome;
use bookhound_pipeline::{DownloadPipeline, PipelineConfig, TorrentDaemon, TrackerSearch};
use bookhound_transmission::{
    AddedTorrent, MonitorOptions, StatusSource, TorrentFile, TorrentStatus, TransmissionError,
};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Tracker that knows about exactly one book, "Dune" by Frank Herbert.
pub struct DuneTracker;

#[async_trait]
impl TrackerSearch for DuneTracker {
    async fn search(&self, title: &str, author: &str, _limit: usize) -> SearchOutcome {
        let candidates = if title.eq_ignore_ascii_case("dune") {
            vec![Candidate {
                id: "1".to_string(),
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                size: 2048,
                seeders: 50,
                leechers: 1,
                download_url: "https://tracker.example/tor/download.php?tid=1".to_string(),
                format: "epub".to_string(),
                category: "Ebooks - Science Fiction".to_string(),
                confidence_score: 0.0,
            }
            .scored(title, author)]
        } else {
            Vec::new()
        };
        SearchOutcome {
            candidates,
            auth_failed: false,
        }
    }

    async fn fetch_metadata_file(&self, _candidate: &Candidate, destination: &Path) -> bool {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(destination, b"d4:infod4:name4:Duneee").unwrap();
        true
    }
}

/// Daemon whose torrents are seeding as soon as they are added.
pub struct InstantDaemon {
    download_dir: String,
    next_id: AtomicI64,
    pub ratio: Mutex<f64>,
    pub removed: Mutex<Vec<i64>>,
}

impl InstantDaemon {
    fn status(&self, id: i64) -> Option<TorrentStatus> {
        if self.removed.lock().unwrap().contains(&id) {
            return None;
        }
        Some(TorrentStatus {
            id,
            hash: format!("hash-{id}"),
            name: "Dune".to_string(),
            status_code: 6,
            progress: 1.0,
            total_size: 2048,
            uploaded_bytes: 4096,
            ratio: *self.ratio.lock().unwrap(),
            download_dir: self.download_dir.clone(),
            files: vec![TorrentFile {
                name: "Dune/Dune.epub".to_string(),
                length: 2048,
                bytes_completed: 2048,
            }],
            ..Default::default()
        })
    }
}

#[async_trait]
impl StatusSource for InstantDaemon {
    async fn fetch_status(&self, id: i64) -> Result<Option<TorrentStatus>, TransmissionError> {
        Ok(self.status(id))
    }
}

#[async_trait]
impl TorrentDaemon for InstantDaemon {
    async fn add(&self, _metadata_file: &Path, _download_dir: &Path) -> Option<AddedTorrent> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Some(AddedTorrent {
            id,
            hash: format!("hash-{id}"),
            name: "Dune".to_string(),
            duplicate: false,
        })
    }

    async fn get_status(&self, id: i64) -> Option<TorrentStatus> {
        self.status(id)
    }

    async fn remove(&self, id: i64, _delete_files: bool) -> bool {
        self.removed.lock().unwrap().push(id);
        true
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub pipeline: Arc<DownloadPipeline>,
    pub daemon: Arc<InstantDaemon>,
    pub dir: tempfile::TempDir,
}

/// Build the full application router over fake clients, using the given
/// database pool.
pub fn build_test_app(pool: PgPool) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let download_dir = dir.path().join("downloads");
    std::fs::create_dir_all(download_dir.join("Dune")).unwrap();
    std::fs::write(download_dir.join("Dune/Dune.epub"), b"epub").unwrap();

    let daemon = Arc::new(InstantDaemon {
        download_dir: download_dir.to_string_lossy().into_owned(),
        next_id: AtomicI64::new(0),
        ratio: Mutex::new(0.0),
        removed: Mutex::new(Vec::new()),
    });
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
        Arc::new(DuneTracker) as Arc<dyn TrackerSearch>,
        daemon.clone() as Arc<dyn TorrentDaemon>,
        config,
    );

    let state = AppState {
        pool,
        config: Arc::new(test_config()),
        pipeline: Arc::clone(&pipeline),
    };

    TestApp {
        router: build_app_router(state),
        pipeline,
        daemon,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll until the request reaches `status` and its task has exited.
pub async fn wait_for_status(pipeline: &DownloadPipeline, request_id: RequestId, status: DownloadStatus) {
    for _ in 0..500 {
        let row = pipeline.get(request_id).await.unwrap();
        if row.status() == Some(status) && !pipeline.tasks().is_running(request_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request {request_id} never reached {status}");
}
