//! Cookie session persistence.
//!
//! Cookies are loaded once at construction from a JSON file and written
//! back whenever the tracker rotates one through `Set-Cookie`. The jar
//! lock is never held across the file write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};

/// Name of the tracker's session cookie.
pub const SESSION_COOKIE: &str = "mam_id";

/// On-disk layout of the session file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    cookies: BTreeMap<String, String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Cookie jar backed by a JSON file.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    cookies: Mutex<BTreeMap<String, String>>,
    /// Serializes file writes so the newest jar always lands last.
    write_lock: tokio::sync::Mutex<()>,
}

impl SessionStore {
    /// Load cookies from `path`.
    ///
    /// A missing or unreadable file yields an empty jar. `seed_mam_id` is
    /// used only when the file holds no session cookie.
    pub fn load(path: impl Into<PathBuf>, seed_mam_id: Option<&str>) -> Self {
        let path = path.into();
        let mut cookies = match read_session_file(&path) {
            Ok(Some(file)) => file.cookies,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                BTreeMap::new()
            }
        };

        if let Some(seed) = seed_mam_id {
            cookies
                .entry(SESSION_COOKIE.to_string())
                .or_insert_with(|| seed.to_string());
        }

        Self {
            path,
            cookies: Mutex::new(cookies),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    /// Render the jar as a `Cookie` request header value.
    pub fn cookie_header(&self) -> Option<String> {
        let cookies = self.lock();
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Merge every `Set-Cookie` in `headers` into the jar and persist the
    /// jar if anything changed. Returns whether it changed.
    pub async fn absorb(&self, headers: &HeaderMap) -> bool {
        let updates: Vec<(String, String)> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        if !self.merge(updates) {
            return false;
        }

        let _writing = self.write_lock.lock().await;
        let snapshot = self.lock().clone();
        if let Err(e) = write_session_file(&self.path, snapshot).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist session cookies");
        } else {
            tracing::debug!(path = %self.path.display(), "Session cookies updated");
        }
        true
    }

    fn merge(&self, updates: Vec<(String, String)>) -> bool {
        let mut cookies = self.lock();
        let mut changed = false;
        for (name, value) in updates {
            if cookies.get(&name) != Some(&value) {
                cookies.insert(name, value);
                changed = true;
            }
        }
        changed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Extract `(name, value)` from a `Set-Cookie` header value.
///
/// Attributes after the first `;` are ignored. Empty names and deletion
/// markers (`deleted` or an empty value) are rejected.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    let value = value.trim().trim_matches('"');
    if name.is_empty() || value.is_empty() || value == "deleted" {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

fn read_session_file(path: &Path) -> std::io::Result<Option<SessionFile>> {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn write_session_file(path: &Path, cookies: BTreeMap<String, String>) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = SessionFile {
        cookies,
        updated_at: Some(Utc::now()),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(path, json).await
}
