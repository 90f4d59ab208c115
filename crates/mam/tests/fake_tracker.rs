//! Tracker client tests against an in-process fake tracker.

use std::time::{Duration, Instant};

use axum::extract::Query;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bookhound_core::matching::Candidate;
use bookhound_mam::session::SESSION_COOKIE;
use bookhound_mam::{MamClient, MamConfig};
use serde_json::json;

// ---------------------------------------------------------------------------
// Fake tracker
// ---------------------------------------------------------------------------

const VALID_COOKIE: &str = "mam_id=good";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(VALID_COOKIE) || v.contains("mam_id=rotated"))
}

async fn search(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }
    let text = body["tor"]["text"].as_str().unwrap_or_default().to_string();
    if text.contains("Xyzzy123") {
        return Json(json!({"error": "Nothing returned, out of 0"})).into_response();
    }
    Json(json!({"data": [
        {
            "id": 2, "title": "Dune Messiah", "author_info": "{\"1\":\"Frank Herbert\"}",
            "size": "900 KiB", "seeders": 20, "leechers": 1,
            "filetype": "epub", "catname": "Ebooks - Science Fiction"
        },
        {
            "id": 1, "title": "Dune", "author_info": "{\"1\":\"Frank Herbert\"}",
            "size": "1.2 MiB", "seeders": 50, "leechers": 2,
            "filetype": "epub", "catname": "Ebooks - Science Fiction"
        },
        {
            "id": 3, "title": "Dune", "author_info": "{\"1\":\"Frank Herbert\"}",
            "size": "300 MiB", "seeders": 0, "leechers": 0,
            "filetype": "m4b", "catname": "Audiobooks - Science Fiction"
        },
        { "title": "row without id" }
    ]}))
    .into_response()
}

#[derive(serde::Deserialize)]
struct DownloadParams {
    tid: String,
}

async fn download(headers: HeaderMap, Query(params): Query<DownloadParams>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }
    match params.tid.as_str() {
        "1" => (
            [(header::SET_COOKIE, "mam_id=rotated; path=/; HttpOnly")],
            b"d8:announce15:http://tracker/4:infod4:name4:Duneee".to_vec(),
        )
            .into_response(),
        "html" => "<html>login</html>".into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_tracker() -> String {
    let app = Router::new()
        .route("/tor/js/loadSearchJSONbasic.php", post(search))
        .route("/tor/download.php", get(download));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: String, dir: &tempfile::TempDir, mam_id: Option<&str>) -> MamClient {
    MamClient::new(MamConfig {
        base_url,
        session_file: dir.path().join("session.json"),
        mam_id: mam_id.map(String::from),
        min_request_interval: Duration::from_millis(50),
        ..Default::default()
    })
    .unwrap()
}

fn candidate(base_url: &str, tid: &str) -> Candidate {
    Candidate {
        id: tid.to_string(),
        title: "Dune".to_string(),
        author: "Frank Herbert".to_string(),
        size: 1024,
        seeders: 1,
        leechers: 0,
        download_url: format!("{base_url}/tor/download.php?tid={tid}"),
        format: "epub".to_string(),
        category: String::new(),
        confidence_score: 1.0,
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_returns_ranked_candidates() {
    let base = spawn_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client(base, &dir, Some("good"));

    let results = client.search("Dune", "Frank Herbert", 10).await;

    assert_eq!(results.len(), 3, "row without id is skipped");
    assert_eq!(results[0].id, "1");
    assert_eq!(results[0].confidence_score, 1.0);
    for pair in results.windows(2) {
        assert!(pair[0].confidence_score >= pair[1].confidence_score);
    }
    assert_eq!(results.last().unwrap().id, "3", "audiobook without seeders ranks last");
}

#[tokio::test]
async fn search_respects_limit() {
    let base = spawn_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client(base, &dir, Some("good"));

    let results = client.search("Dune", "Frank Herbert", 1).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "1");
}

#[tokio::test]
async fn no_results_is_empty_not_error() {
    let base = spawn_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client(base, &dir, Some("good"));

    let outcome = client
        .search_detailed("Obscure Title Xyzzy123", "Nobody", 10)
        .await;
    assert!(outcome.candidates.is_empty());
    assert!(!outcome.auth_failed);
}

#[tokio::test]
async fn forbidden_reports_auth_failure() {
    let base = spawn_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client(base, &dir, Some("expired"));

    let outcome = client.search_detailed("Dune", "Frank Herbert", 10).await;
    assert!(outcome.candidates.is_empty());
    assert!(outcome.auth_failed);
}

#[tokio::test]
async fn unreachable_tracker_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let client = client("http://127.0.0.1:1".to_string(), &dir, Some("good"));

    let outcome = client.search_detailed("Dune", "Frank Herbert", 10).await;
    assert!(outcome.candidates.is_empty());
    assert!(!outcome.auth_failed);
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consecutive_calls_are_separated_by_min_interval() {
    let base = spawn_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let client = MamClient::new(MamConfig {
        base_url: base,
        session_file: dir.path().join("session.json"),
        mam_id: Some("good".to_string()),
        min_request_interval: Duration::from_millis(400),
        ..Default::default()
    })
    .unwrap();

    let start = Instant::now();
    client.search("Dune", "Frank Herbert", 10).await;
    let first_done = start.elapsed();
    // A clone shares the limiter.
    client.clone().search("Dune", "Frank Herbert", 10).await;

    assert!(first_done < Duration::from_millis(400));
    assert!(start.elapsed() >= Duration::from_millis(400));
}

// ---------------------------------------------------------------------------
// Metadata download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_metadata_writes_file_and_persists_rotated_cookie() {
    let base = spawn_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client(base.clone(), &dir, Some("good"));
    let dest = dir.path().join("torrents/nested/1.torrent");

    assert!(client.fetch_metadata_file(&candidate(&base, "1"), &dest).await);

    let bytes = std::fs::read(&dest).unwrap();
    assert!(bytes.starts_with(b"d8:announce"));
    assert_eq!(client.session().get(SESSION_COOKIE).as_deref(), Some("rotated"));

    let saved = std::fs::read_to_string(dir.path().join("session.json")).unwrap();
    assert!(saved.contains("rotated"));
}

#[tokio::test]
async fn fetch_metadata_rejects_non_torrent_and_missing() {
    let base = spawn_tracker().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client(base.clone(), &dir, Some("good"));

    let html_dest = dir.path().join("html.torrent");
    assert!(!client.fetch_metadata_file(&candidate(&base, "html"), &html_dest).await);
    assert!(!html_dest.exists());

    let missing_dest = dir.path().join("missing.torrent");
    assert!(!client.fetch_metadata_file(&candidate(&base, "404"), &missing_dest).await);
    assert!(!missing_dest.exists());
}
