mod setup;

use mediaroom_core::Config;
use mediaroom_infra::{init_telemetry, TelemetryConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    init_telemetry(&TelemetryConfig::from_log_format(&config.base.log_format))?;

    tracing::info!(
        environment = %config.base.environment,
        storage_backend = %config.storage.backend,
        "Starting mediaroom worker"
    );

    let pool = setup::database::setup_database(&config).await?;

    let shutdown = CancellationToken::new();
    let workers = setup::workers::start_workers(&config, pool.clone(), &shutdown).await?;

    shutdown_signal().await;
    shutdown.cancel();
    for worker in workers {
        worker.shutdown().await;
    }
    pool.close().await;

    tracing::info!("Worker stopped");
    Ok(())
}

/// Signal handler for graceful shutdown
///
/// # Panics
/// - Panics if Ctrl+C signal handler cannot be installed (unrecoverable system error)
/// - On Unix systems, panics if SIGTERM signal handler cannot be installed (unrecoverable system error)
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
