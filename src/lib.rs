pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::services::{SyncOutcome, SyncStatus, SyncTrigger};
pub use domain::entities::{OperationRequest, QueuedOperation};
pub use shared::{AppConfig, AppError};
pub use state::{AppRuntime, AppState};

use tracing::info;

pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Start the sync runtime from environment configuration and run until Ctrl-C.
pub async fn run() -> Result<(), AppError> {
    init_logging();

    let config = AppConfig::from_env();
    info!(base_url = %config.api.base_url, "courier sync starting...");

    let state = AppState::new(config).await?;
    let runtime = state.start().await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::Internal(format!("Failed to listen for shutdown: {err}")))?;

    info!("shutdown requested");
    runtime.shutdown().await;
    state.pool.close().await;
    Ok(())
}
