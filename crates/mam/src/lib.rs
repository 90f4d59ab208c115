//! Client for the private tracker's search and download endpoints.
//!
//! Provides rate-limited search with confidence-scored results, `.torrent`
//! metadata download, and cookie session persistence.

pub mod client;
pub mod config;
pub mod error;
pub mod parser;
pub mod rate_limit;
pub mod session;

pub use client::{MamClient, SearchOutcome};
pub use config::MamConfig;
pub use error::MamError;
pub use parser::ParseError;
