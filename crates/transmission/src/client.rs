//! RPC client for a Transmission daemon.
//!
//! Every call is a JSON `POST` of `{method, arguments}`. The daemon guards
//! its endpoint with an `X-Transmission-Session-Id` handshake: a call
//! without the current id is answered with 409 carrying the id, which is
//! stored and the call retried once.

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::TransmissionConfig;
use crate::error::TransmissionError;
use crate::monitor::{self, MonitorOptions, MonitorOutcome, ProgressObserver, StatusSource};
use crate::status::{TorrentStatus, STATUS_FIELDS};

/// Header carrying the daemon's anti-CSRF session id.
pub const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Identity of a torrent after `torrent-add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedTorrent {
    /// Daemon-assigned torrent id (the daemon session id).
    pub id: i64,
    #[serde(rename = "hashString")]
    pub hash: String,
    pub name: String,
    /// The daemon already had this torrent.
    #[serde(skip)]
    pub duplicate: bool,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

/// Client for one daemon. Cheap to clone the inner `reqwest::Client`, but
/// the session id is per instance; share it behind an `Arc`.
#[derive(Debug)]
pub struct TransmissionClient {
    http: reqwest::Client,
    config: TransmissionConfig,
    session_id: RwLock<Option<String>>,
}

impl TransmissionClient {
    pub fn new(config: TransmissionConfig) -> Result<Self, TransmissionError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            session_id: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &TransmissionConfig {
        &self.config
    }

    /// Current session id, if a handshake has happened.
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ---- public operations (never fail) ----

    /// Add the torrent in `metadata_file`, downloading into `download_dir`.
    ///
    /// A torrent the daemon already has counts as success and yields the
    /// existing torrent.
    pub async fn add(&self, metadata_file: &Path, download_dir: &Path) -> Option<AddedTorrent> {
        match self.try_add(metadata_file, download_dir).await {
            Ok(added) => {
                tracing::info!(
                    torrent_id = added.id,
                    hash = %added.hash,
                    duplicate = added.duplicate,
                    "Torrent added to daemon",
                );
                Some(added)
            }
            Err(e) => {
                tracing::error!(path = %metadata_file.display(), error = %e, "Failed to add torrent");
                None
            }
        }
    }

    /// Current status of torrent `id`, or `None` if unknown or unreachable.
    pub async fn get_status(&self, id: i64) -> Option<TorrentStatus> {
        match self.try_get_status(id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(torrent_id = id, error = %e, "Failed to get torrent status");
                None
            }
        }
    }

    /// Remove torrent `id`, optionally deleting its downloaded data.
    pub async fn remove(&self, id: i64, delete_files: bool) -> bool {
        match self.try_remove(id, delete_files).await {
            Ok(()) => {
                tracing::info!(torrent_id = id, delete_files, "Torrent removed from daemon");
                true
            }
            Err(e) => {
                tracing::error!(torrent_id = id, error = %e, "Failed to remove torrent");
                false
            }
        }
    }

    /// Poll torrent `id` until it completes, errors, or `cancel` fires.
    pub async fn monitor(
        &self,
        id: i64,
        observer: &dyn ProgressObserver,
        options: &MonitorOptions,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> MonitorOutcome {
        monitor::monitor(self, id, observer, options, cancel).await
    }

    // ---- fallible operations ----

    pub async fn try_add(
        &self,
        metadata_file: &Path,
        download_dir: &Path,
    ) -> Result<AddedTorrent, TransmissionError> {
        let bytes = tokio::fs::read(metadata_file).await?;
        let metainfo = base64::engine::general_purpose::STANDARD.encode(bytes);
        let arguments = json!({
            "metainfo": metainfo,
            "download-dir": download_dir.to_string_lossy(),
        });

        let response = self.call("torrent-add", arguments).await?;
        parse_added(&response)
    }

    pub async fn try_get_status(&self, id: i64) -> Result<Option<TorrentStatus>, TransmissionError> {
        let arguments = json!({ "ids": [id], "fields": STATUS_FIELDS });
        let response = self.call("torrent-get", arguments).await?;

        let torrents = response
            .get("torrents")
            .and_then(Value::as_array)
            .ok_or_else(|| TransmissionError::InvalidResponse("missing `torrents`".to_string()))?;
        match torrents.first() {
            Some(t) => serde_json::from_value(t.clone())
                .map(Some)
                .map_err(|e| TransmissionError::InvalidResponse(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn try_remove(&self, id: i64, delete_files: bool) -> Result<(), TransmissionError> {
        let arguments = json!({ "ids": [id], "delete-local-data": delete_files });
        self.call("torrent-remove", arguments).await?;
        Ok(())
    }

    // ---- private helpers ----

    /// Issue one RPC call and return its `arguments` on `result == "success"`.
    async fn call(&self, method: &str, arguments: Value) -> Result<Value, TransmissionError> {
        let body = json!({ "method": method, "arguments": arguments });

        let mut response = self.post(&body).await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            self.store_session_id(&response)?;
            tracing::debug!(method, "Refreshed daemon session id");
            response = self.post(&body).await?;
            if response.status() == reqwest::StatusCode::CONFLICT {
                return Err(TransmissionError::SessionHandshake);
            }
        }

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(TransmissionError::Unauthorized);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransmissionError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| TransmissionError::InvalidResponse(e.to_string()))?;
        if rpc.result != "success" {
            return Err(TransmissionError::Rpc {
                method: method.to_string(),
                result: rpc.result,
            });
        }
        Ok(rpc.arguments)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, TransmissionError> {
        let mut request = self.http.post(&self.config.url).json(body);
        if let Some(id) = self.session_id() {
            request = request.header(SESSION_ID_HEADER, id);
        }
        if let Some(user) = &self.config.username {
            request = request.basic_auth(user, self.config.password.as_ref());
        }
        Ok(request.send().await?)
    }

    fn store_session_id(&self, response: &reqwest::Response) -> Result<(), TransmissionError> {
        let id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(TransmissionError::SessionHandshake)?;
        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) = Some(id.to_string());
        Ok(())
    }
}

#[async_trait]
impl StatusSource for TransmissionClient {
    async fn fetch_status(&self, id: i64) -> Result<Option<TorrentStatus>, TransmissionError> {
        self.try_get_status(id).await
    }
}

/// Decode `torrent-added` / `torrent-duplicate` from `torrent-add` arguments.
fn parse_added(arguments: &Value) -> Result<AddedTorrent, TransmissionError> {
    let (entry, duplicate) = match (arguments.get("torrent-added"), arguments.get("torrent-duplicate")) {
        (Some(added), _) => (added, false),
        (None, Some(dup)) => (dup, true),
        (None, None) => {
            return Err(TransmissionError::InvalidResponse(
                "torrent-add returned neither torrent-added nor torrent-duplicate".to_string(),
            ))
        }
    };
    let mut added: AddedTorrent = serde_json::from_value(entry.clone())
        .map_err(|e| TransmissionError::InvalidResponse(e.to_string()))?;
    added.duplicate = duplicate;
    Ok(added)
}
