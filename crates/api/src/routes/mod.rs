pub mod downloads;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the download route tree.
///
/// Route hierarchy:
///
/// ```text
/// /download/start                  create a request (POST)
/// /download/status/{id}            full status object (GET)
/// /download/history                paged history (GET)
/// /download/active                 in-flight requests (GET)
/// /download/cancel/{id}            cancel (DELETE)
/// /download/retry/{id}             retry a failed request (POST)
/// /download/stats                  counts and success rate (GET)
/// /download/seeding                unremoved seeding records (GET)
/// /download/cleanup/{id}           remove a seeded torrent (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/download", downloads::router())
}
