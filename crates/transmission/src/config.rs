use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "http://localhost:9091/transmission/rpc";

/// Timeout applied to every RPC call.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Daemon connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TransmissionConfig {
    /// Full RPC endpoint URL.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.to_string(),
            username: None,
            password: None,
            timeout: RPC_TIMEOUT,
        }
    }
}

impl TransmissionConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                                   |
    /// |-------------------------|-------------------------------------------|
    /// | `TRANSMISSION_URL`      | `http://localhost:9091/transmission/rpc`  |
    /// | `TRANSMISSION_USERNAME` | unset                                     |
    /// | `TRANSMISSION_PASSWORD` | unset                                     |
    pub fn from_env() -> Self {
        let url = std::env::var("TRANSMISSION_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.into());
        let username = std::env::var("TRANSMISSION_USERNAME")
            .ok()
            .filter(|v| !v.is_empty());
        let password = std::env::var("TRANSMISSION_PASSWORD")
            .ok()
            .filter(|v| !v.is_empty());

        Self {
            url,
            username,
            password,
            ..Default::default()
        }
    }
}
