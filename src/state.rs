use crate::application::ports::{BackendApi, OperationStore, ReachabilityProbe};
use crate::application::services::{
    ConnectivityMonitor, LocalReadCache, OutboxEngine, SyncHandle, SyncOptions, SyncOrchestrator,
    SyncStatus,
};
use crate::domain::RetryPolicy;
use crate::domain::entities::{OperationRequest, QueuedOperation};
use crate::domain::value_objects::EntityId;
use crate::infrastructure::{
    ConnectionPool, HttpBackendApi, HttpReachabilityProbe, SqliteEntityCache,
    SqliteOperationStore,
};
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Wires the stores, services and background tasks together.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: ConnectionPool,
    pub outbox: Arc<OutboxEngine>,
    pub cache: Arc<LocalReadCache>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub sync: Arc<SyncOrchestrator>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let pool = ConnectionPool::new(&config.database).await?;
        pool.migrate().await?;
        let api: Arc<dyn BackendApi> = Arc::new(HttpBackendApi::new(&config.api)?);

        Self::with_components(config, pool, api, Arc::new(SystemClock))
    }

    /// Build on an already migrated pool with the given backend and clock.
    pub fn with_components(
        config: AppConfig,
        pool: ConnectionPool,
        api: Arc<dyn BackendApi>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let cache = Arc::new(LocalReadCache::with_config(
            Arc::new(SqliteEntityCache::new(pool.clone())),
            clock.clone(),
            &config.cache,
        ));
        let store: Arc<dyn OperationStore> = Arc::new(SqliteOperationStore::new(pool.clone()));
        let outbox = Arc::new(
            OutboxEngine::new(
                store,
                cache.clone(),
                api.clone(),
                clock.clone(),
                RetryPolicy::from(&config.retry),
            )
            .with_request_timeout(Duration::from_secs(config.api.request_timeout.max(1))),
        );
        let connectivity = Arc::new(ConnectivityMonitor::new(config.connectivity.assume_online));
        let sync = Arc::new(SyncOrchestrator::new(
            outbox.clone(),
            cache.clone(),
            api,
            connectivity.clone(),
            clock,
            SyncOptions::from_config(&config.sync)?,
        ));

        Ok(Self {
            config: Arc::new(config),
            pool,
            outbox,
            cache,
            connectivity,
            sync,
        })
    }

    pub async fn enqueue(
        &self,
        target: EntityId,
        request: OperationRequest,
    ) -> Result<QueuedOperation, AppError> {
        self.outbox.enqueue(target, request).await
    }

    pub async fn status(&self) -> Result<SyncStatus, AppError> {
        self.sync.status().await
    }

    /// Recover interrupted work and start the sync loop and health probe.
    pub async fn start(&self) -> Result<AppRuntime, AppError> {
        self.outbox.recover_interrupted().await?;

        let sync = self.sync.start();
        let probe = if self.config.connectivity.probe_enabled {
            let probe: Arc<dyn ReachabilityProbe> =
                Arc::new(HttpReachabilityProbe::new(&self.config.api)?);
            Some(self.connectivity.spawn_probe(
                probe,
                Duration::from_secs(self.config.connectivity.probe_interval.max(1)),
                sync.shutdown_signal(),
            ))
        } else {
            None
        };

        info!(
            probe = probe.is_some(),
            offline_first = self.config.sync.offline_first,
            "sync runtime started"
        );
        Ok(AppRuntime { sync, probe })
    }
}

/// Background tasks owned by a started [`AppState`].
pub struct AppRuntime {
    pub sync: SyncHandle,
    probe: Option<JoinHandle<()>>,
}

impl AppRuntime {
    pub async fn shutdown(self) {
        self.sync.shutdown().await;
        if let Some(probe) = self.probe {
            let _ = probe.await;
        }
        info!("sync runtime stopped");
    }
}
