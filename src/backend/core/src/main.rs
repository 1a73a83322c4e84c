//! Apex Scheduler - Main entry point
//!
//! Boots a standalone job scheduler and keeps it running until it
//! receives a shutdown signal.

use std::sync::Arc;

use apex_core::{
    config::Config,
    observability,
    scheduler::{InMemoryJobStore, SchedulerFacade, TokioWorkerPool},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    observability::init("apex-scheduler", config.observability.otlp_endpoint.as_deref())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Apex Scheduler"
    );

    let worker_count = if config.scheduler.worker_pool_size > 0 {
        config.scheduler.worker_pool_size
    } else {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    };
    let store = Arc::new(InMemoryJobStore::new());
    let pool = Arc::new(TokioWorkerPool::new(worker_count));
    let scheduler = SchedulerFacade::new("apex-scheduler", store, pool, config.scheduler);

    scheduler.start().await?;
    tracing::info!("Scheduler started");

    shutdown_signal().await;

    tracing::info!("Shutdown signal received, draining running jobs");
    scheduler.shutdown(true).await?;

    observability::shutdown();
    tracing::info!("Scheduler shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
