//! HTTP client for the tracker.
//!
//! Every call passes through the shared [`RateLimiter`] and carries the
//! session cookies; `Set-Cookie` updates on any response are persisted.
//! The public operations never fail: errors are logged and surface as an
//! empty result or `false`. The `try_*` variants expose the error.

use std::path::Path;
use std::sync::Arc;

use bookhound_core::matching::{rank_candidates, Candidate};
use reqwest::header::COOKIE;
use serde::Serialize;

use crate::config::MamConfig;
use crate::error::MamError;
use crate::parser::{self, ParseError};
use crate::rate_limit::RateLimiter;
use crate::session::SessionStore;

/// Path of the JSON search endpoint.
pub const SEARCH_PATH: &str = "/tor/js/loadSearchJSONbasic.php";

/// Tracker main category id for ebooks.
const EBOOKS_MAIN_CATEGORY: &str = "14";

/// Result of a search, distinguishing "nothing found" from "not logged in".
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Ranked best-first, at most `limit` entries.
    pub candidates: Vec<Candidate>,
    /// The tracker answered 403 to the session cookie.
    pub auth_failed: bool,
}

/// Rate-limited tracker client. Clones share the limiter and session.
#[derive(Debug, Clone)]
pub struct MamClient {
    http: reqwest::Client,
    config: Arc<MamConfig>,
    limiter: Arc<RateLimiter>,
    session: Arc<SessionStore>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    tor: SearchParams<'a>,
    #[serde(rename = "dlLink")]
    dl_link: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams<'a> {
    text: &'a str,
    srch_in: [&'a str; 2],
    search_type: &'a str,
    search_in: &'a str,
    main_cat: [&'a str; 1],
    sort_type: &'a str,
    start_number: &'a str,
    perpage: usize,
}

impl MamClient {
    /// Build a client, loading the session file named in `config`.
    pub fn new(config: MamConfig) -> Result<Self, MamError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bookhound/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let session = SessionStore::load(&config.session_file, config.mam_id.as_deref());
        if session.get(crate::session::SESSION_COOKIE).is_none() {
            tracing::warn!("No tracker session cookie configured; searches will be rejected");
        }
        Ok(Self {
            http,
            limiter: Arc::new(RateLimiter::new(config.min_request_interval)),
            session: Arc::new(session),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &MamConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Search for a book and return scored candidates, best first.
    ///
    /// Returns an empty list when nothing matches or on any failure.
    pub async fn search(&self, title: &str, author: &str, limit: usize) -> Vec<Candidate> {
        self.search_detailed(title, author, limit).await.candidates
    }

    /// Like [`search`](Self::search) but reports an authentication failure.
    pub async fn search_detailed(&self, title: &str, author: &str, limit: usize) -> SearchOutcome {
        match self.try_search(title, author, limit).await {
            Ok(candidates) => {
                tracing::info!(title, author, found = candidates.len(), "Tracker search complete");
                SearchOutcome {
                    candidates,
                    auth_failed: false,
                }
            }
            Err(MamError::AuthFailed) => {
                tracing::error!(title, author, "Tracker rejected session cookie (HTTP 403)");
                SearchOutcome {
                    candidates: Vec::new(),
                    auth_failed: true,
                }
            }
            Err(e) => {
                tracing::warn!(title, author, error = %e, "Tracker search failed");
                SearchOutcome::default()
            }
        }
    }

    /// Search, surfacing errors.
    pub async fn try_search(
        &self,
        title: &str,
        author: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, MamError> {
        let query = bookhound_core::acquisition::build_search_query(title, author);
        let body = SearchRequest {
            tor: SearchParams {
                text: &query,
                srch_in: ["title", "author"],
                search_type: "all",
                search_in: "torrents",
                main_cat: [EBOOKS_MAIN_CATEGORY],
                sort_type: "default",
                start_number: "0",
                perpage: limit.max(1),
            },
            dl_link: "",
        };

        let request = self
            .http
            .post(format!("{}{SEARCH_PATH}", self.config.base_url))
            .json(&body)
            .timeout(self.config.request_timeout);
        let response = self.send(request).await?;
        let text = response.text().await?;

        let mut candidates: Vec<Candidate> = parser::parse_search_response(&text, &self.config.base_url)?
            .into_iter()
            .map(|c| c.scored(title, author))
            .collect();
        rank_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Download the `.torrent` for `candidate` to `destination`, creating
    /// parent directories. Returns `false` on any failure.
    pub async fn fetch_metadata_file(&self, candidate: &Candidate, destination: &Path) -> bool {
        match self.try_fetch_metadata_file(candidate, destination).await {
            Ok(bytes) => {
                tracing::info!(
                    torrent_id = %candidate.id,
                    path = %destination.display(),
                    bytes,
                    "Torrent file saved",
                );
                true
            }
            Err(e) => {
                tracing::warn!(torrent_id = %candidate.id, error = %e, "Failed to download torrent file");
                false
            }
        }
    }

    /// Download the `.torrent`, surfacing errors. Returns the byte count.
    pub async fn try_fetch_metadata_file(
        &self,
        candidate: &Candidate,
        destination: &Path,
    ) -> Result<usize, MamError> {
        let request = self
            .http
            .get(&candidate.download_url)
            .timeout(self.config.download_timeout);
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        if !parser::looks_like_torrent(&bytes) {
            return Err(ParseError::NotTorrent.into());
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, &bytes).await?;
        Ok(bytes.len())
    }

    // ---- private helpers ----

    /// Rate-limit, attach cookies, send, absorb `Set-Cookie`, and map
    /// error statuses.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, MamError> {
        self.limiter.acquire().await;

        let request = match self.session.cookie_header() {
            Some(cookies) => request.header(COOKIE, cookies),
            None => request,
        };
        let response = request.send().await?;
        self.session.absorb(response.headers()).await;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(MamError::AuthFailed);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(MamError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}
