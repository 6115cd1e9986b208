#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use courier_sync_lib::application::ports::{ApiRequest, ApiResponse, BackendApi, DispatchError};
use courier_sync_lib::application::services::{
    ConnectivityMonitor, LocalReadCache, OutboxEngine, SyncOptions, SyncOrchestrator,
};
use courier_sync_lib::domain::RetryPolicy;
use courier_sync_lib::domain::entities::{
    OperationRequest, PhotoUpload, ScanRecord, ShiftPunch, StatusChange,
};
use courier_sync_lib::domain::value_objects::{EntityId, HttpMethod};
use courier_sync_lib::infrastructure::{
    ConnectionPool, MemoryEntityCache, SqliteEntityCache, SqliteOperationStore,
};
use courier_sync_lib::shared::ManualClock;
use courier_sync_lib::shared::config::DatabaseConfig;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type Outcome = Result<ApiResponse, DispatchError>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub endpoint: String,
    pub operation_id: Option<String>,
    pub body: Option<Value>,
}

/// Fake backend: per-endpoint scripted outcomes, 200 once a script runs dry.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    always: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<Vec<RecordedCall>>,
    pulls: Mutex<Vec<String>>,
    entities: Mutex<Option<Result<Vec<Value>, DispatchError>>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, endpoint: &str, outcomes: Vec<Outcome>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn always(&self, endpoint: &str, outcome: Outcome) {
        self.always
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), outcome);
    }

    pub fn set_entities(&self, entities: Vec<Value>) {
        *self.entities.lock().unwrap() = Some(Ok(entities));
    }

    pub fn fail_pulls(&self, error: DispatchError) {
        *self.entities.lock().unwrap() = Some(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.endpoint).collect()
    }

    pub fn operation_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.operation_id)
            .collect()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .count()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.pulls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendApi for ScriptedBackend {
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, DispatchError> {
        let endpoint = request.endpoint.to_string();
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method,
            endpoint: endpoint.clone(),
            operation_id: request.idempotency_key.as_ref().map(|id| id.to_string()),
            body: request.body.clone(),
        });

        if let Some(outcome) = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        if let Some(outcome) = self.always.lock().unwrap().get(&endpoint) {
            return outcome.clone();
        }
        Ok(ApiResponse::ok(None))
    }

    async fn fetch_entities(&self, path: &str) -> Result<Vec<Value>, DispatchError> {
        self.pulls.lock().unwrap().push(path.to_string());
        self.entities
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn server_error() -> Outcome {
    Err(DispatchError::Http {
        status: 503,
        body: Some("unavailable".into()),
    })
}

pub fn rejected() -> Outcome {
    Err(DispatchError::Http {
        status: 422,
        body: Some("invalid transition".into()),
    })
}

pub fn ok_with(body: Value) -> Outcome {
    Ok(ApiResponse::ok(Some(body)))
}

pub struct TestContext {
    pub pool: ConnectionPool,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<SqliteOperationStore>,
    pub cache: Arc<LocalReadCache>,
    pub engine: Arc<OutboxEngine>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub sync: Arc<SyncOrchestrator>,
}

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

pub async fn memory_pool() -> ConnectionPool {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    pool.migrate().await.expect("migrations");
    pool
}

pub async fn file_pool(path: &Path) -> ConnectionPool {
    let config = DatabaseConfig {
        url: format!("sqlite:{}", path.display()),
        max_connections: 1,
        connection_timeout: 5,
    };
    let pool = ConnectionPool::new(&config).await.expect("file sqlite");
    pool.migrate().await.expect("migrations");
    pool
}

pub async fn setup() -> TestContext {
    build(memory_pool().await, RetryPolicy::default(), SyncOptions::default(), true, false)
}

pub async fn setup_with(policy: RetryPolicy, options: SyncOptions, online: bool) -> TestContext {
    build(memory_pool().await, policy, options, online, false)
}

/// Context over an existing pool; the entity cache is stored in SQLite too.
pub fn on_pool(pool: ConnectionPool, backend: Arc<ScriptedBackend>) -> TestContext {
    build_with_backend(
        pool,
        backend,
        RetryPolicy::default(),
        SyncOptions::default(),
        true,
        true,
    )
}

fn build(
    pool: ConnectionPool,
    policy: RetryPolicy,
    options: SyncOptions,
    online: bool,
    persistent_cache: bool,
) -> TestContext {
    build_with_backend(
        pool,
        ScriptedBackend::new(),
        policy,
        options,
        online,
        persistent_cache,
    )
}

fn build_with_backend(
    pool: ConnectionPool,
    backend: Arc<ScriptedBackend>,
    policy: RetryPolicy,
    options: SyncOptions,
    online: bool,
    persistent_cache: bool,
) -> TestContext {
    let clock = Arc::new(ManualClock::new(start_time()));
    let cache = if persistent_cache {
        LocalReadCache::new(Arc::new(SqliteEntityCache::new(pool.clone())), clock.clone())
    } else {
        LocalReadCache::new(Arc::new(MemoryEntityCache::new()), clock.clone())
    };
    let cache = Arc::new(cache);
    let store = Arc::new(SqliteOperationStore::new(pool.clone()));
    let engine = Arc::new(OutboxEngine::new(
        store.clone(),
        cache.clone(),
        backend.clone(),
        clock.clone(),
        policy,
    ));
    let connectivity = Arc::new(ConnectivityMonitor::new(online));
    let sync = Arc::new(SyncOrchestrator::new(
        engine.clone(),
        cache.clone(),
        backend.clone(),
        connectivity.clone(),
        clock.clone(),
        options,
    ));

    TestContext {
        pool,
        clock,
        backend,
        store,
        cache,
        engine,
        connectivity,
        sync,
    }
}

pub fn entity(id: &str) -> EntityId {
    EntityId::new(id.to_string()).expect("entity id")
}

pub fn status_update(status: &str) -> OperationRequest {
    OperationRequest::StatusUpdate(StatusChange {
        status: status.to_string(),
        note: None,
        occurred_at: start_time(),
    })
}

pub fn photo(name: &str) -> OperationRequest {
    OperationRequest::BinaryUpload(PhotoUpload {
        file_name: name.to_string(),
        content_type: "image/jpeg".into(),
        data: vec![0xff, 0xd8, 0xff, 0xe0],
        caption: None,
    })
}

pub fn scan(code: &str) -> OperationRequest {
    OperationRequest::Scan(ScanRecord {
        code: code.to_string(),
        symbology: None,
        scanned_at: start_time(),
    })
}

pub fn clock_in() -> OperationRequest {
    OperationRequest::ClockIn(ShiftPunch {
        occurred_at: start_time(),
        latitude: None,
        longitude: None,
    })
}
