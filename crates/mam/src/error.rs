use crate::parser::ParseError;

/// Errors from the tracker client.
///
/// The public search and download methods never return these; they log
/// them and degrade to an empty result or `false`.
#[derive(Debug, thiserror::Error)]
pub enum MamError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The tracker rejected the session cookie.
    #[error("Tracker authentication failed (HTTP 403)")]
    AuthFailed,

    /// The tracker returned another non-2xx status code.
    #[error("Tracker error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
