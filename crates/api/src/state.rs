use std::sync::Arc;

use bookhound_pipeline::DownloadPipeline;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the pool and everything else sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: bookhound_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Download orchestrator; owns every in-flight request task.
    pub pipeline: Arc<DownloadPipeline>,
}
