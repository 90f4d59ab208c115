//! Transmission daemon RPC client.
//!
//! Provides the session-id handshake, torrent add/status/remove, and a
//! cancellable progress monitor that polls a torrent until it finishes.

pub mod client;
pub mod config;
pub mod error;
pub mod monitor;
pub mod status;

pub use client::{AddedTorrent, TransmissionClient};
pub use config::TransmissionConfig;
pub use error::TransmissionError;
pub use monitor::{monitor, MonitorEnd, MonitorOptions, MonitorOutcome, ProgressObserver, StatusSource};
pub use status::{TorrentFile, TorrentStatus};
