//! Handlers for download requests and seeding records.
//!
//! Every handler delegates to the [`DownloadPipeline`](bookhound_pipeline::DownloadPipeline)
//! held in [`AppState`]; none touches the daemon or tracker directly.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::header::USER_AGENT;
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use bookhound_core::error::CoreError;
use bookhound_core::types::RequestId;

use crate::error::{AppError, AppResult};
use crate::query::HistoryQuery;
use crate::response::{MessageResponse, PagedResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a path id. Anything that is not a UUID cannot name a request.
fn parse_request_id(raw: &str) -> AppResult<RequestId> {
    raw.trim().parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "DownloadRequest",
            id: raw.to_string(),
        })
    })
}

/// First `X-Forwarded-For` hop, falling back to the peer address.
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

// ---------------------------------------------------------------------------
// POST /download/start
// ---------------------------------------------------------------------------

/// Body of `POST /download/start`. Missing fields are reported as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct StartDownloadBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartDownloadResponse {
    pub request_id: RequestId,
    pub status: &'static str,
    pub message: String,
}

/// Create a download request and start acquiring it in the background.
pub async fn start_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(body): Json<StartDownloadBody>,
) -> AppResult<impl IntoResponse> {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip_address = client_ip(&headers, &extensions);

    let request = state
        .pipeline
        .start(
            body.title.as_deref().unwrap_or_default(),
            body.author.as_deref().unwrap_or_default(),
            user_agent,
            ip_address,
        )
        .await?;

    let status = request.status().map(|s| s.as_str()).unwrap_or("initiated");
    Ok((
        StatusCode::CREATED,
        Json(StartDownloadResponse {
            request_id: request.request_id,
            status,
            message: format!("Download started for '{}' by {}", request.title, request.author),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /download/status/{id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let request_id = parse_request_id(&id)?;
    let request = state.pipeline.get(request_id).await?;
    Ok(Json(request))
}

/// GET /download/history, newest first.
pub async fn list_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let status = params.status_filter()?;
    let limit = params.limit();
    let offset = params.offset();
    let (items, total) = state.pipeline.history(status, limit, offset).await?;
    Ok(Json(PagedResponse {
        items,
        total,
        limit,
        offset,
    }))
}

/// GET /download/active
pub async fn list_active(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.pipeline.active().await?))
}

/// GET /download/stats
pub async fn get_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.pipeline.stats().await?))
}

/// GET /download/seeding
pub async fn list_seeding(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.pipeline.seeding().await?))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// DELETE /download/cancel/{id}
pub async fn cancel_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let request_id = parse_request_id(&id)?;
    state.pipeline.cancel(request_id).await?;
    Ok(Json(MessageResponse::new(format!("Download {request_id} cancelled"))))
}

/// POST /download/retry/{id}
pub async fn retry_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let request_id = parse_request_id(&id)?;
    state.pipeline.retry(request_id).await?;
    Ok(Json(MessageResponse::new(format!("Download {request_id} restarted"))))
}

/// POST /download/cleanup/{id}
pub async fn cleanup_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let request_id = parse_request_id(&id)?;
    let record = state.pipeline.cleanup(request_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Torrent {} removed from the download client",
        record.daemon_hash
    ))))
}
