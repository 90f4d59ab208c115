use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.myanonamouse.net";
pub const DEFAULT_SESSION_FILE: &str = "mam_session.json";
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 3100;

/// Timeout for search calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for `.torrent` downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Tracker client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MamConfig {
    /// Tracker base URL without a trailing slash.
    pub base_url: String,
    /// JSON file holding the persisted session cookies.
    pub session_file: PathBuf,
    /// Seed value for the `mam_id` cookie when the session file lacks one.
    pub mam_id: Option<String>,
    /// Minimum delay between two consecutive tracker requests.
    pub min_request_interval: Duration,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for MamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            mam_id: None,
            min_request_interval: Duration::from_millis(DEFAULT_MIN_REQUEST_INTERVAL_MS),
            request_timeout: REQUEST_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
        }
    }
}

impl MamConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                        |
    /// |-------------------------------|--------------------------------|
    /// | `MAM_BASE_URL`                | `https://www.myanonamouse.net` |
    /// | `MAM_SESSION_FILE`            | `mam_session.json`             |
    /// | `MAM_ID`                      | unset                          |
    /// | `MAM_MIN_REQUEST_INTERVAL_MS` | `3100`                         |
    pub fn from_env() -> Self {
        let base_url = std::env::var("MAM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();

        let session_file = std::env::var("MAM_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE));

        let mam_id = std::env::var("MAM_ID").ok().filter(|v| !v.trim().is_empty());

        let interval_ms: u64 = std::env::var("MAM_MIN_REQUEST_INTERVAL_MS")
            .unwrap_or_else(|_| DEFAULT_MIN_REQUEST_INTERVAL_MS.to_string())
            .parse()
            .expect("MAM_MIN_REQUEST_INTERVAL_MS must be a valid u64");

        Self {
            base_url,
            session_file,
            mam_id,
            min_request_interval: Duration::from_millis(interval_ms),
            ..Default::default()
        }
    }
}
