//! Download acquisition pipeline.
//!
//! [`DownloadPipeline`] owns each request's lifecycle: tracker search,
//! candidate selection, metadata download, hand-off to the torrent daemon,
//! progress monitoring, and completion bookkeeping. Every transition is
//! persisted so state survives restarts and can be queried externally.

pub mod clients;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod seeding;

pub use clients::{TorrentDaemon, TrackerSearch};
pub use config::{PipelineConfig, SeedingPolicy};
pub use error::PipelineError;
pub use lifecycle::{DownloadPipeline, RecoveryReport};
