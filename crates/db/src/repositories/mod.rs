//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod download_request_repo;
pub mod seeding_record_repo;

pub use download_request_repo::DownloadRequestRepo;
pub use seeding_record_repo::SeedingRecordRepo;
