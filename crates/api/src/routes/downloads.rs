//! Route definitions for download requests.
//!
//! Mounted by `api_routes()` at `/download`.

use axum::Router;
use axum::routing::{delete, get, post};

use crate::handlers::downloads;
use crate::state::AppState;

/// Download request routes.
///
/// ```text
/// POST   /start             -> start_download
/// GET    /status/{id}       -> get_status
/// GET    /history           -> list_history
/// GET    /active            -> list_active
/// DELETE /cancel/{id}       -> cancel_download
/// POST   /retry/{id}        -> retry_download
/// GET    /stats             -> get_stats
/// GET    /seeding           -> list_seeding
/// POST   /cleanup/{id}      -> cleanup_download
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(downloads::start_download))
        .route("/status/{id}", get(downloads::get_status))
        .route("/history", get(downloads::list_history))
        .route("/active", get(downloads::list_active))
        .route("/cancel/{id}", delete(downloads::cancel_download))
        .route("/retry/{id}", post(downloads::retry_download))
        .route("/stats", get(downloads::get_stats))
        .route("/seeding", get(downloads::list_seeding))
        .route("/cleanup/{id}", post(downloads::cleanup_download))
}
