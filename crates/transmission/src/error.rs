/// Errors from the Transmission RPC layer.
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The daemon kept answering 409 or omitted the session header.
    #[error("Session id handshake failed")]
    SessionHandshake,

    #[error("Daemon rejected credentials (HTTP 401)")]
    Unauthorized,

    /// The daemon returned another non-2xx status code.
    #[error("Daemon HTTP error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The RPC envelope's `result` was not `success`.
    #[error("RPC {method} failed: {result}")]
    Rpc { method: String, result: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
