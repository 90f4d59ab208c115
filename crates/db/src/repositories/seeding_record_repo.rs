//! Repository for the `seeding_records` table.

use bookhound_core::types::{DbId, RequestId};
use sqlx::PgPool;

use crate::models::seeding_record::{CreateSeedingRecord, SeedingRecord};

const COLUMNS: &str = "id, request_id, daemon_hash, daemon_session_id, total_size, \
    uploaded_bytes, ratio, seeding_started_at, last_checked_at, seeding_complete, \
    removed_at, created_at, updated_at";

/// Tracks seeding obligations for completed downloads.
pub struct SeedingRecordRepo;

impl SeedingRecordRepo {
    /// Record the seeding obligation for a completed request.
    ///
    /// A request completed again after a retry refreshes the existing row
    /// instead of failing on `uq_seeding_records_request_id`.
    pub async fn create(
        pool: &PgPool,
        input: &CreateSeedingRecord,
    ) -> Result<SeedingRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO seeding_records
                (request_id, daemon_hash, daemon_session_id, total_size, uploaded_bytes, ratio)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT ON CONSTRAINT uq_seeding_records_request_id DO UPDATE SET
                daemon_hash = EXCLUDED.daemon_hash,
                daemon_session_id = EXCLUDED.daemon_session_id,
                total_size = EXCLUDED.total_size,
                uploaded_bytes = EXCLUDED.uploaded_bytes,
                ratio = EXCLUDED.ratio,
                seeding_started_at = NOW(),
                last_checked_at = NULL,
                seeding_complete = FALSE,
                removed_at = NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SeedingRecord>(&query)
            .bind(input.request_id)
            .bind(&input.daemon_hash)
            .bind(input.daemon_session_id)
            .bind(input.total_size)
            .bind(input.uploaded_bytes)
            .bind(input.ratio)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_request_id(
        pool: &PgPool,
        request_id: RequestId,
    ) -> Result<Option<SeedingRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM seeding_records WHERE request_id = $1");
        sqlx::query_as::<_, SeedingRecord>(&query)
            .bind(request_id)
            .fetch_optional(pool)
            .await
    }

    /// Every record whose torrent is still in the daemon, oldest first.
    pub async fn list_unremoved(pool: &PgPool) -> Result<Vec<SeedingRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM seeding_records \
             WHERE removed_at IS NULL ORDER BY seeding_started_at ASC, id ASC"
        );
        sqlx::query_as::<_, SeedingRecord>(&query)
            .fetch_all(pool)
            .await
    }

    /// Store a fresh upload snapshot. `seeding_complete` never flips back
    /// to false once set.
    pub async fn update_stats(
        pool: &PgPool,
        id: DbId,
        uploaded_bytes: i64,
        ratio: f64,
        seeding_complete: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE seeding_records SET \
                uploaded_bytes = $2, \
                ratio = $3, \
                seeding_complete = seeding_complete OR $4, \
                last_checked_at = NOW() \
             WHERE id = $1 AND removed_at IS NULL",
        )
        .bind(id)
        .bind(uploaded_bytes)
        .bind(ratio)
        .bind(seeding_complete)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp `removed_at` once the torrent has left the daemon.
    pub async fn mark_removed(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE seeding_records SET removed_at = NOW() WHERE id = $1 AND removed_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
