//! Download request lifecycle: status state machine, request validation,
//! and ebook file location.
//!
//! The status discriminants match the seed order of the
//! `download_statuses` lookup table.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Status state machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a download request.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Initiated = 1,
    Searching = 2,
    Found = 3,
    Downloading = 4,
    Completed = 5,
    Failed = 6,
    Cancelled = 7,
}

/// Statuses in which a background task is (or should be) working on the request.
pub const ACTIVE_STATUSES: &[DownloadStatus] = &[
    DownloadStatus::Searching,
    DownloadStatus::Found,
    DownloadStatus::Downloading,
];

/// Every status, in lookup-table order.
pub const ALL_STATUSES: &[DownloadStatus] = &[
    DownloadStatus::Initiated,
    DownloadStatus::Searching,
    DownloadStatus::Found,
    DownloadStatus::Downloading,
    DownloadStatus::Completed,
    DownloadStatus::Failed,
    DownloadStatus::Cancelled,
];

impl DownloadStatus {
    /// Return the database status ID.
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Look up a status by its database ID.
    pub fn from_id(id: i16) -> Option<Self> {
        ALL_STATUSES.iter().copied().find(|s| s.id() == id)
    }

    /// Lowercase name used in the API and the lookup table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Searching => "searching",
            Self::Found => "found",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Cancellation is honoured only while a task is actively working.
    pub fn is_cancellable(self) -> bool {
        ACTIVE_STATUSES.contains(&self)
    }

    pub fn is_retryable(self) -> bool {
        self == Self::Failed
    }

    /// Whether the pipeline may move a request from `self` to `next`.
    ///
    /// The only edge leaving a terminal status is `failed -> initiated`
    /// (explicit retry). `initiated -> failed` covers requests interrupted
    /// by a restart before their search began.
    pub fn can_transition_to(self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        matches!(
            (self, next),
            (Initiated, Searching)
                | (Initiated, Failed)
                | (Searching, Found)
                | (Searching, Failed)
                | (Searching, Cancelled)
                | (Found, Downloading)
                | (Found, Failed)
                | (Found, Cancelled)
                | (Downloading, Completed)
                | (Downloading, Failed)
                | (Downloading, Cancelled)
                | (Failed, Initiated)
        )
    }

    /// All statuses from which `next` can be reached.
    ///
    /// Repositories use this to make status writes conditional on the
    /// row's current status.
    pub fn predecessors(next: DownloadStatus) -> Vec<DownloadStatus> {
        ALL_STATUSES
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ALL_STATUSES
            .iter()
            .copied()
            .find(|st| st.as_str() == needle)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unknown status: '{s}'. Valid statuses: {}",
                    ALL_STATUSES
                        .iter()
                        .map(|st| st.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

/// Maximum accepted length of a title or author field.
pub const MAX_FIELD_LEN: usize = 500;

/// Validate and normalise a (title, author) pair.
///
/// Both fields are trimmed and must be non-empty.
pub fn validate_book_request(title: &str, author: &str) -> Result<(String, String), CoreError> {
    let title = collapse_whitespace(title);
    let author = collapse_whitespace(author);

    if title.is_empty() || author.is_empty() {
        return Err(CoreError::Validation(
            "Missing required fields: title and author".to_string(),
        ));
    }
    if title.len() > MAX_FIELD_LEN || author.len() > MAX_FIELD_LEN {
        return Err(CoreError::Validation(format!(
            "title and author must be at most {MAX_FIELD_LEN} characters"
        )));
    }
    Ok((title, author))
}

/// Build the free-text tracker query for a book.
pub fn build_search_query(title: &str, author: &str) -> String {
    collapse_whitespace(&format!("{title} {author}"))
}

/// Error message recorded when the tracker returns no candidates.
pub fn no_torrents_message(title: &str, author: &str) -> String {
    format!("No torrents found for '{title}' by '{author}'")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Convert the daemon's fractional progress (0.0 - 1.0) to a percentage
/// rounded to two decimals and clamped to 0 - 100.
pub fn percent_from_fraction(fraction: f64) -> f64 {
    if !fraction.is_finite() {
        return 0.0;
    }
    ((fraction * 100.0).clamp(0.0, 100.0) * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Ebook files
// ---------------------------------------------------------------------------

/// The format the pipeline is trying to acquire.
pub const TARGET_FORMAT: &str = "epub";

/// Recognised ebook extensions, most preferred first.
pub const EBOOK_EXTENSIONS: &[&str] = &["epub", "pdf", "mobi", "azw3", "azw", "djvu", "fb2", "txt"];

/// Return the lowercase ebook format of `path`, if its extension is one of
/// [`EBOOK_EXTENSIONS`].
pub fn detect_format(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EBOOK_EXTENSIONS.iter().copied().find(|e| *e == ext)
}

fn format_rank(format: &str) -> usize {
    EBOOK_EXTENSIONS
        .iter()
        .position(|e| *e == format)
        .unwrap_or(EBOOK_EXTENSIONS.len())
}

/// Locate the downloaded ebook.
///
/// `known_files` are paths reported by the daemon, relative to
/// `download_dir`. Those are checked first; if none exists on disk with an
/// ebook extension, only the torrent's own root directory is scanned:
/// `download_dir/torrent_name`, or the first component shared by the known
/// files. `download_dir` itself is never scanned, since it holds other
/// downloads. When several candidates match, the most preferred format
/// wins, then the lexicographically smallest path.
///
/// Blocking: walks the filesystem with `std::fs`.
pub fn locate_ebook_file(
    download_dir: &Path,
    torrent_name: &str,
    known_files: &[String],
) -> Option<(PathBuf, String)> {
    let known: Vec<(PathBuf, &'static str)> = known_files
        .iter()
        .filter(|f| is_contained(Path::new(f)))
        .map(|f| download_dir.join(f))
        .filter(|p| p.is_file())
        .filter_map(|p| detect_format(&p).map(|fmt| (p, fmt)))
        .collect();

    let candidates = if known.is_empty() {
        let root = torrent_root(download_dir, torrent_name, known_files)?;
        let mut found = Vec::new();
        scan_dir(&root, &mut found, 0);
        found
    } else {
        known
    };

    candidates
        .into_iter()
        .min_by(|(pa, fa), (pb, fb)| format_rank(fa).cmp(&format_rank(fb)).then(pa.cmp(pb)))
        .map(|(p, fmt)| (p, fmt.to_string()))
}

/// True when `path` is relative and has only normal components.
fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

/// The directory holding this torrent's files, if it has one.
fn torrent_root(download_dir: &Path, torrent_name: &str, known_files: &[String]) -> Option<PathBuf> {
    let from_name = Some(Path::new(torrent_name))
        .filter(|name| is_contained(name) && name.components().count() == 1)
        .map(Path::to_path_buf);
    let from_files = || {
        known_files
            .iter()
            .map(Path::new)
            .filter(|f| is_contained(f) && f.components().count() > 1)
            .find_map(|f| f.components().next())
            .map(|c| PathBuf::from(c.as_os_str()))
    };

    from_name
        .into_iter()
        .chain(from_files())
        .map(|rel| download_dir.join(rel))
        .find(|root| root.is_dir())
}

/// Directory depth limit for the fallback scan.
const MAX_SCAN_DEPTH: usize = 8;

fn scan_dir(dir: &Path, found: &mut Vec<(PathBuf, &'static str)>, depth: usize) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_dir(&path, found, depth + 1);
        } else if let Some(fmt) = detect_format(&path) {
            found.push((path, fmt));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
