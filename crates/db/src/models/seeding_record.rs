//! Seeding record entity model and DTOs.

use bookhound_core::types::{DbId, RequestId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `seeding_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SeedingRecord {
    pub id: DbId,
    pub request_id: RequestId,
    pub daemon_hash: String,
    pub daemon_session_id: Option<i64>,
    pub total_size: i64,
    pub uploaded_bytes: i64,
    pub ratio: f64,
    pub seeding_started_at: Timestamp,
    pub last_checked_at: Option<Timestamp>,
    pub seeding_complete: bool,
    pub removed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a seeding record at completion time.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSeedingRecord {
    pub request_id: RequestId,
    pub daemon_hash: String,
    pub daemon_session_id: Option<i64>,
    pub total_size: i64,
    pub uploaded_bytes: i64,
    pub ratio: f64,
}
