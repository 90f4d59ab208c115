use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookhound_api::config::ServerConfig;
use bookhound_api::router::build_app_router;
use bookhound_api::state::AppState;
use bookhound_mam::{MamClient, MamConfig};
use bookhound_pipeline::{DownloadPipeline, PipelineConfig, TorrentDaemon, TrackerSearch};
use bookhound_transmission::{TransmissionClient, TransmissionConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bookhound_api=debug,bookhound_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    let pipeline_config = PipelineConfig::from_env();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = bookhound_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    bookhound_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    bookhound_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Clients ---
    let mam_config = MamConfig::from_env();
    tracing::info!(base_url = %mam_config.base_url, "Tracker client configured");
    let tracker = MamClient::new(mam_config).expect("Failed to build tracker client");

    let transmission_config = TransmissionConfig::from_env();
    tracing::info!(url = %transmission_config.url, "Download client configured");
    let daemon = TransmissionClient::new(transmission_config)
        .expect("Failed to build download client");

    // --- Pipeline ---
    let pipeline = DownloadPipeline::new(
        pool.clone(),
        Arc::new(tracker) as Arc<dyn TrackerSearch>,
        Arc::new(daemon) as Arc<dyn TorrentDaemon>,
        pipeline_config,
    );
    match pipeline.recover().await {
        Ok(report) => tracing::info!(
            reattached = report.reattached,
            failed = report.failed,
            "Startup recovery finished",
        ),
        Err(e) => tracing::error!(error = %e, "Startup recovery failed"),
    }
    let seeding_handle = pipeline.spawn_seeding_monitor();

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        pipeline: Arc::clone(&pipeline),
    };
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    pipeline.shutdown().await;
    tracing::info!("Download tasks stopped");

    let _ = tokio::time::timeout(
        Duration::from_secs(config.shutdown_timeout_secs),
        seeding_handle,
    )
    .await;
    tracing::info!("Seeding monitor stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
