use crate::application::ports::{ApiRequest, BackendApi, DispatchError, OperationStore};
use crate::application::services::LocalReadCache;
use crate::domain::entities::{
    FlushReport, OperationFilter, OperationPatch, OperationRequest, QueuedOperation,
};
use crate::domain::value_objects::{
    DispatchLane, EntityId, EntityType, OperationId, OperationStatus,
};
use crate::domain::{RetryDecision, RetryPolicy};
use crate::infrastructure::outbox::{
    DispatchOutcomeMetadata, DispatchOutcomeStatus, OutboxMetrics, OutboxMetricsSnapshot,
};
use crate::shared::clock::Clock;
use crate::shared::error::AppError;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, error, info, warn};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

enum Attempt {
    Delivered,
    Retried(OperationPatch),
    Failed(OperationPatch),
    /// The store could not record the attempt; leave the operation for later.
    Skipped,
}

/// Durable mutation queue with ordered, retried delivery.
pub struct OutboxEngine {
    store: Arc<dyn OperationStore>,
    cache: Arc<LocalReadCache>,
    api: Arc<dyn BackendApi>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    request_timeout: Duration,
    metrics: OutboxMetrics,
    // one flush at a time
    gate: Mutex<()>,
    enqueued: Notify,
    retry_schedule: watch::Sender<Option<DateTime<Utc>>>,
}

/// Operations of one entity are delivered in order; the key includes the type
/// so an order and a driver sharing an id stay independent.
type EntityKey = (EntityType, EntityId);

fn entity_key(operation: &QueuedOperation) -> EntityKey {
    (operation.entity_type(), operation.target_entity_id.clone())
}

impl OutboxEngine {
    pub fn new(
        store: Arc<dyn OperationStore>,
        cache: Arc<LocalReadCache>,
        api: Arc<dyn BackendApi>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            api,
            clock,
            policy,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            metrics: OutboxMetrics::new(),
            gate: Mutex::new(()),
            enqueued: Notify::new(),
            retry_schedule: watch::channel(None).0,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Persist a mutation and apply its optimistic patch to the read cache.
    ///
    /// Returns once the operation is durable. Nothing is sent here.
    pub async fn enqueue(
        &self,
        target: EntityId,
        request: OperationRequest,
    ) -> Result<QueuedOperation, AppError> {
        request.validate()?;

        let kind = request.kind();
        // stored timestamps carry millisecond precision
        let now = self.clock.now().trunc_subsecs(3);
        let operation = QueuedOperation::new_pending(
            kind,
            target.clone(),
            request.endpoint(&target)?,
            request.method(),
            request.payload()?,
            kind.default_priority(),
            self.policy.max_attempts,
            now,
        );
        let operation = self.store.append(operation).await?;

        if let Some(patch) = request.optimistic_patch() {
            if let Err(err) = self
                .cache
                .apply_optimistic(&kind.entity_type(), &target, &patch, now)
                .await
            {
                warn!(
                    operation_id = %operation.id,
                    entity_id = %target,
                    error = %err,
                    "optimistic cache update failed"
                );
            }
        }

        info!(
            operation_id = %operation.id,
            kind = %kind,
            entity_id = %target,
            "operation enqueued"
        );
        self.enqueued.notify_one();
        Ok(operation)
    }

    /// Resolves after the next successful [`OutboxEngine::enqueue`].
    pub async fn wait_enqueued(&self) {
        self.enqueued.notified().await;
    }

    /// Earliest retry deadline among operations next in line for their
    /// entity, republished after every flush.
    pub fn retry_schedule(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.retry_schedule.subscribe()
    }

    pub fn scheduled_retry(&self) -> Option<DateTime<Utc>> {
        *self.retry_schedule.borrow()
    }

    /// Put operations left in flight by an interrupted process back in line.
    pub async fn recover_interrupted(&self) -> Result<u64, AppError> {
        let _guard = self.gate.lock().await;
        let recovered = self.store.reset_in_flight().await?;
        if recovered > 0 {
            info!(recovered, "recovered interrupted operations");
        }
        Ok(recovered)
    }

    /// Deliver every due operation in `lanes`.
    ///
    /// Operations for one entity go out strictly in enqueue order; across
    /// entities the lowest priority goes first. Each operation is attempted at
    /// most once per pass, and an entity whose head fails is skipped for the
    /// rest of the pass.
    pub async fn flush(&self, lanes: &[DispatchLane]) -> Result<FlushReport, AppError> {
        let _guard = self.gate.lock().await;

        // nothing else dispatches while the gate is held
        let stale = self.store.reset_in_flight().await?;
        if stale > 0 {
            warn!(stale, "reset operations left in flight");
        }

        let mut operations = self.store.list(OperationFilter::all()).await?;
        let mut report = FlushReport::default();
        let mut attempted: HashSet<OperationId> = HashSet::new();
        let mut blocked: HashSet<EntityKey> = HashSet::new();

        loop {
            let now = self.clock.now();
            let Some(index) = next_eligible(&operations, lanes, &attempted, &blocked, now) else {
                break;
            };
            let operation = operations[index].clone();
            attempted.insert(operation.id.clone());
            report.attempted += 1;

            match self.attempt(&operation, &operations).await {
                Attempt::Delivered => {
                    operations.remove(index);
                    report.completed += 1;
                }
                Attempt::Retried(patch) => {
                    operations[index].apply(&patch);
                    blocked.insert(entity_key(&operation));
                    report.retried += 1;
                }
                Attempt::Failed(patch) => {
                    operations[index].apply(&patch);
                    blocked.insert(entity_key(&operation));
                    report.failed += 1;
                }
                Attempt::Skipped => {
                    blocked.insert(entity_key(&operation));
                    report.skipped += 1;
                }
            }
        }

        report.next_retry_at = earliest_retry(&operations);
        self.retry_schedule.send_replace(report.next_retry_at);
        if report.attempted > 0 {
            info!(
                lanes = ?lanes,
                attempted = report.attempted,
                completed = report.completed,
                retried = report.retried,
                failed = report.failed,
                skipped = report.skipped,
                "outbox flush finished"
            );
        }
        Ok(report)
    }

    async fn attempt(&self, operation: &QueuedOperation, queue: &[QueuedOperation]) -> Attempt {
        let started_at = self.clock.now();
        if let Err(err) = self
            .store
            .update(&operation.id, OperationPatch::in_flight(started_at))
            .await
        {
            error!(operation_id = %operation.id, error = %err, "could not mark operation in flight");
            return Attempt::Skipped;
        }

        let request = ApiRequest {
            method: operation.method,
            endpoint: operation.endpoint.clone(),
            body: operation
                .method
                .carries_body()
                .then(|| operation.payload.as_json().clone()),
            idempotency_key: Some(operation.id.clone()),
        };

        debug!(
            operation_id = %operation.id,
            method = %operation.method,
            endpoint = %operation.endpoint,
            attempt = operation.attempts + 1,
            "dispatching operation"
        );
        let timer = Instant::now();
        let result = match tokio::time::timeout(self.request_timeout, self.api.dispatch(&request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout),
        };
        let duration_ms = timer.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                if let Err(err) = self.store.remove(&operation.id).await {
                    // stays in flight and is redelivered on the next pass
                    error!(operation_id = %operation.id, error = %err, "could not remove delivered operation");
                    return Attempt::Skipped;
                }

                if operation.kind.reconciles_entity() {
                    let outstanding = has_outstanding_work(queue, operation);
                    if let Err(err) = self
                        .cache
                        .reconcile(
                            &operation.entity_type(),
                            &operation.target_entity_id,
                            response.body.as_ref(),
                            operation.created_at,
                            outstanding,
                        )
                        .await
                    {
                        warn!(operation_id = %operation.id, error = %err, "cache reconcile failed");
                    }
                }

                self.metrics.record(
                    DispatchOutcomeStatus::Delivered,
                    DispatchOutcomeMetadata {
                        duration_ms: Some(duration_ms),
                        attempts: Some(operation.attempts + 1),
                        ..metadata_for(operation)
                    },
                );
                info!(
                    operation_id = %operation.id,
                    status = response.status,
                    duration_ms,
                    "operation delivered"
                );
                Attempt::Delivered
            }
            Err(dispatch_error) => self.record_failure(operation, dispatch_error, duration_ms).await,
        }
    }

    async fn record_failure(
        &self,
        operation: &QueuedOperation,
        dispatch_error: DispatchError,
        duration_ms: u64,
    ) -> Attempt {
        let finished_at = self.clock.now();
        let attempts = (operation.attempts + 1).min(operation.max_attempts);
        let message = dispatch_error.to_string();
        let decision = self.policy.decide(
            attempts,
            operation.max_attempts,
            dispatch_error.failure_class(),
            finished_at,
        );

        let (patch, status, backoff_ms) = match decision {
            RetryDecision::Retry { next_retry_at } => (
                OperationPatch::retry(attempts, finished_at, next_retry_at, message.clone()),
                DispatchOutcomeStatus::Retried,
                (next_retry_at - finished_at).num_milliseconds().max(0) as u64,
            ),
            RetryDecision::Fail => (
                OperationPatch::failed(attempts, finished_at, message.clone()),
                DispatchOutcomeStatus::Failed,
                0,
            ),
        };

        if let Err(err) = self.store.update(&operation.id, patch.clone()).await {
            error!(operation_id = %operation.id, error = %err, "could not record failed attempt");
            return Attempt::Skipped;
        }

        self.metrics.record(
            status,
            DispatchOutcomeMetadata {
                attempts: Some(attempts),
                backoff_ms: Some(backoff_ms),
                duration_ms: Some(duration_ms),
                error: Some(message.clone()),
                ..metadata_for(operation)
            },
        );

        match decision {
            RetryDecision::Retry { next_retry_at } => {
                warn!(
                    operation_id = %operation.id,
                    attempts,
                    next_retry_at = %next_retry_at,
                    error = %message,
                    "operation failed; will retry"
                );
                Attempt::Retried(patch)
            }
            RetryDecision::Fail => {
                error!(
                    operation_id = %operation.id,
                    kind = %operation.kind,
                    attempts,
                    error = %message,
                    "operation failed permanently"
                );
                Attempt::Failed(patch)
            }
        }
    }

    /// Re-arm a failed operation with a fresh attempt budget.
    pub async fn retry_failed(&self, id: &OperationId) -> Result<QueuedOperation, AppError> {
        let mut operation = self.failed_operation(id).await?;
        let patch = OperationPatch::rearm();
        self.store.update(id, patch.clone()).await?;
        operation.apply(&patch);

        info!(operation_id = %id, "failed operation re-armed");
        self.enqueued.notify_one();
        Ok(operation)
    }

    /// Discard a failed operation. Its optimistic cache state is released once
    /// nothing else is outstanding for the entity.
    pub async fn purge_failed(&self, id: &OperationId) -> Result<QueuedOperation, AppError> {
        let operation = self.failed_operation(id).await?;
        self.store.remove(id).await?;

        if operation.kind.reconciles_entity() {
            let remaining = self
                .store
                .list(OperationFilter::all().for_target(operation.target_entity_id.clone()))
                .await?;
            if !has_outstanding_work(&remaining, &operation) {
                self.cache
                    .mark_synced(&operation.entity_type(), &operation.target_entity_id)
                    .await?;
            }
        }

        info!(operation_id = %id, kind = %operation.kind, "failed operation purged");
        // later operations of the entity may be due now
        self.enqueued.notify_one();
        Ok(operation)
    }

    async fn failed_operation(&self, id: &OperationId) -> Result<QueuedOperation, AppError> {
        let operation = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Operation not found: {id}")))?;
        if operation.status != OperationStatus::Failed {
            return Err(AppError::InvalidInput(format!(
                "Operation {id} is {}, not failed",
                operation.status
            )));
        }
        Ok(operation)
    }

    pub async fn operations(
        &self,
        filter: OperationFilter,
    ) -> Result<Vec<QueuedOperation>, AppError> {
        self.store.list(filter).await
    }

    pub async fn failed_operations(&self) -> Result<Vec<QueuedOperation>, AppError> {
        self.store
            .list(OperationFilter::with_status(OperationStatus::Failed))
            .await
    }

    /// Operations still waiting for delivery, in flight included.
    pub async fn pending_count(&self) -> Result<u64, AppError> {
        let pending = self.store.count(OperationStatus::Pending).await?;
        let in_flight = self.store.count(OperationStatus::InFlight).await?;
        Ok(pending + in_flight)
    }

    pub async fn failed_count(&self) -> Result<u64, AppError> {
        self.store.count(OperationStatus::Failed).await
    }

    pub async fn next_retry_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let active = self.store.list(OperationFilter::active()).await?;
        Ok(earliest_retry(&active))
    }

    pub fn metrics(&self) -> OutboxMetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn metadata_for(operation: &QueuedOperation) -> DispatchOutcomeMetadata {
    DispatchOutcomeMetadata {
        operation_id: Some(operation.id.to_string()),
        kind: Some(operation.kind.to_string()),
        entity_id: Some(operation.target_entity_id.to_string()),
        max_attempts: Some(operation.max_attempts),
        ..DispatchOutcomeMetadata::default()
    }
}

fn next_eligible(
    operations: &[QueuedOperation],
    lanes: &[DispatchLane],
    attempted: &HashSet<OperationId>,
    blocked: &HashSet<EntityKey>,
    now: DateTime<Utc>,
) -> Option<usize> {
    operations
        .iter()
        .enumerate()
        .filter(|(_, op)| {
            op.status == OperationStatus::Pending
                && lanes.contains(&op.lane())
                && !attempted.contains(&op.id)
                && !blocked.contains(&entity_key(op))
                && op.is_due(now)
                && is_entity_head(operations, op)
        })
        .min_by_key(|(_, op)| op.dispatch_key())
        .map(|(index, _)| index)
}

/// No earlier active operation exists for the same entity.
fn is_entity_head(operations: &[QueuedOperation], operation: &QueuedOperation) -> bool {
    let seq = operation.seq.unwrap_or(i64::MAX);
    let entity_type = operation.entity_type();
    !operations.iter().any(|other| {
        other.target_entity_id == operation.target_entity_id
            && other.entity_type() == entity_type
            && other.status.is_active()
            && other.seq.unwrap_or(i64::MAX) < seq
    })
}

/// Another cache-affecting operation for the entity is queued or failed.
fn has_outstanding_work(operations: &[QueuedOperation], operation: &QueuedOperation) -> bool {
    operations.iter().any(|other| {
        other.id != operation.id
            && other.target_entity_id == operation.target_entity_id
            && other.kind.reconciles_entity()
            && other.kind.entity_type() == operation.kind.entity_type()
            && other.status != OperationStatus::Completed
    })
}

/// Only entity heads count: a later operation cannot go before its head.
fn earliest_retry(operations: &[QueuedOperation]) -> Option<DateTime<Utc>> {
    operations
        .iter()
        .filter(|op| op.status == OperationStatus::Pending && is_entity_head(operations, op))
        .filter_map(|op| op.next_retry_at)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::ApiResponse;
    use crate::domain::entities::{PhotoUpload, StatusChange};
    use crate::domain::value_objects::{EntitySyncStatus, EntityType};
    use crate::infrastructure::cache::MemoryEntityCache;
    use crate::infrastructure::database::ConnectionPool;
    use crate::infrastructure::outbox::SqliteOperationStore;
    use crate::shared::clock::ManualClock;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::always;
    use serde_json::{Value, json};

    mock! {
        pub Backend {}

        #[async_trait]
        impl BackendApi for Backend {
            async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, DispatchError>;
            async fn fetch_entities(&self, path: &str) -> Result<Vec<Value>, DispatchError>;
        }
    }

    struct Harness {
        engine: OutboxEngine,
        store: Arc<SqliteOperationStore>,
        cache: Arc<LocalReadCache>,
        clock: Arc<ManualClock>,
    }

    async fn harness(api: MockBackend) -> Harness {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(LocalReadCache::new(
            Arc::new(MemoryEntityCache::new()),
            clock.clone(),
        ));
        let store = Arc::new(SqliteOperationStore::new(pool));
        let engine = OutboxEngine::new(
            store.clone(),
            cache.clone(),
            Arc::new(api),
            clock.clone(),
            RetryPolicy::default(),
        );
        Harness {
            engine,
            store,
            cache,
            clock,
        }
    }

    fn status(value: &str) -> OperationRequest {
        OperationRequest::StatusUpdate(StatusChange {
            status: value.into(),
            note: None,
            occurred_at: Utc::now(),
        })
    }

    fn order(id: &str) -> EntityId {
        EntityId::new(id.into()).unwrap()
    }

    #[tokio::test]
    async fn enqueue_persists_and_patches_cache() {
        let h = harness(MockBackend::new()).await;

        let op = h.engine.enqueue(order("o-1"), status("picked_up")).await.unwrap();

        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.seq.is_some());
        assert_eq!(h.engine.pending_count().await.unwrap(), 1);
        let cached = h
            .cache
            .get(&EntityType::job(), &order("o-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.status_value(), Some("picked_up"));
        assert_eq!(cached.sync_status, EntitySyncStatus::Pending);
    }

    #[tokio::test]
    async fn enqueue_rejects_invalid_request() {
        let h = harness(MockBackend::new()).await;
        let result = h.engine.enqueue(order("o-1"), status("  ")).await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
        assert_eq!(h.engine.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn successful_flush_removes_operation_and_reconciles() {
        let mut api = MockBackend::new();
        api.expect_dispatch()
            .with(always())
            .times(1)
            .returning(|request| {
                assert!(request.idempotency_key.is_some());
                assert_eq!(request.endpoint.as_str(), "/orders/o-1/status");
                Ok(ApiResponse::ok(Some(
                    json!({"id": "o-1", "status": "picked_up", "eta": 12}),
                )))
            });
        let h = harness(api).await;
        h.engine.enqueue(order("o-1"), status("picked_up")).await.unwrap();

        let report = h.engine.flush(&DispatchLane::ALL).await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(h.engine.pending_count().await.unwrap(), 0);
        let cached = h
            .cache
            .get(&EntityType::job(), &order("o-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.sync_status, EntitySyncStatus::Synced);
        assert_eq!(cached.data["eta"], 12);
        assert_eq!(h.engine.metrics().total_delivered, 1);
    }

    #[tokio::test]
    async fn transient_failure_schedules_backoff() {
        let mut api = MockBackend::new();
        api.expect_dispatch().times(1).returning(|_| {
            Err(DispatchError::Http {
                status: 503,
                body: None,
            })
        });
        let h = harness(api).await;
        h.engine.enqueue(order("o-1"), status("picked_up")).await.unwrap();
        let now = h.clock.now();

        let report = h.engine.flush(&DispatchLane::ALL).await.unwrap();

        assert_eq!(report.retried, 1);
        assert_eq!(report.next_retry_at, Some(now + chrono::Duration::minutes(1)));
        let stored = h.engine.operations(OperationFilter::all()).await.unwrap();
        assert_eq!(stored[0].attempts, 1);
        assert_eq!(stored[0].status, OperationStatus::Pending);
        assert_eq!(stored[0].last_error.as_deref(), Some("HTTP 503"));

        // not due yet: a second pass sends nothing
        let report = h.engine.flush(&DispatchLane::ALL).await.unwrap();
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn client_error_fails_immediately_and_can_be_purged() {
        let mut api = MockBackend::new();
        api.expect_dispatch().times(1).returning(|_| {
            Err(DispatchError::Http {
                status: 422,
                body: Some("invalid transition".into()),
            })
        });
        let h = harness(api).await;
        let op = h.engine.enqueue(order("o-1"), status("teleported")).await.unwrap();

        let report = h.engine.flush(&DispatchLane::ALL).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(h.engine.failed_count().await.unwrap(), 1);

        h.engine.purge_failed(&op.id).await.unwrap();

        assert_eq!(h.engine.failed_count().await.unwrap(), 0);
        let cached = h
            .cache
            .get(&EntityType::job(), &order("o-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.sync_status, EntitySyncStatus::Synced);
    }

    #[tokio::test]
    async fn retry_failed_rejects_non_failed_operations() {
        let h = harness(MockBackend::new()).await;
        let op = h.engine.enqueue(order("o-1"), status("picked_up")).await.unwrap();

        let result = h.engine.retry_failed(&op.id).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));

        let missing = h.engine.retry_failed(&OperationId::generate()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    struct StalledBackend;

    #[async_trait]
    impl BackendApi for StalledBackend {
        async fn dispatch(&self, _request: &ApiRequest) -> Result<ApiResponse, DispatchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ApiResponse::ok(None))
        }

        async fn fetch_entities(&self, _path: &str) -> Result<Vec<Value>, DispatchError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn stalled_backend_counts_as_timeout() {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(LocalReadCache::new(
            Arc::new(MemoryEntityCache::new()),
            clock.clone(),
        ));
        let engine = OutboxEngine::new(
            Arc::new(SqliteOperationStore::new(pool)),
            cache,
            Arc::new(StalledBackend),
            clock,
            RetryPolicy::default(),
        )
        .with_request_timeout(Duration::from_millis(20));
        engine.enqueue(order("o-1"), status("picked_up")).await.unwrap();

        let report = engine.flush(&DispatchLane::ALL).await.unwrap();

        assert_eq!(report.retried, 1);
        let stored = engine.operations(OperationFilter::all()).await.unwrap();
        assert_eq!(stored[0].last_error.as_deref(), Some("request timed out"));
    }

    #[tokio::test]
    async fn lanes_are_flushed_independently() {
        let mut api = MockBackend::new();
        api.expect_dispatch()
            .times(1)
            .returning(|request| {
                assert_eq!(request.endpoint.as_str(), "/orders/o-2/status");
                Ok(ApiResponse::ok(None))
            });
        let h = harness(api).await;
        h.engine
            .enqueue(
                order("o-1"),
                OperationRequest::BinaryUpload(PhotoUpload {
                    file_name: "proof.jpg".into(),
                    content_type: "image/jpeg".into(),
                    data: vec![1, 2, 3],
                    caption: None,
                }),
            )
            .await
            .unwrap();
        h.engine.enqueue(order("o-2"), status("delivered")).await.unwrap();

        let report = h.engine.flush(&[DispatchLane::Mutations]).await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(h.engine.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn same_id_under_different_entity_types_is_independent() {
        let mut api = MockBackend::new();
        api.expect_dispatch().times(2).returning(|request| {
            if request.endpoint.as_str() == "/drivers/7/clock-in" {
                Err(DispatchError::Connection("reset".into()))
            } else {
                Ok(ApiResponse::ok(None))
            }
        });
        let h = harness(api).await;
        let driver = EntityId::new("7".into()).unwrap();
        h.engine
            .enqueue(
                driver,
                OperationRequest::ClockIn(crate::domain::entities::ShiftPunch {
                    occurred_at: Utc::now(),
                    latitude: None,
                    longitude: None,
                }),
            )
            .await
            .unwrap();
        h.engine.enqueue(order("7"), status("picked_up")).await.unwrap();

        let report = h.engine.flush(&DispatchLane::ALL).await.unwrap();

        assert_eq!(report.retried, 1);
        assert_eq!(report.completed, 1);
    }

    #[tokio::test]
    async fn retry_schedule_only_counts_entity_heads() {
        let mut api = MockBackend::new();
        api.expect_dispatch().times(1).returning(|_| {
            Err(DispatchError::Http {
                status: 503,
                body: None,
            })
        });
        let h = harness(api).await;
        let mut schedule = h.engine.retry_schedule();
        let now = h.clock.now();
        h.engine.enqueue(order("o-1"), status("picked_up")).await.unwrap();
        let behind = h.engine.enqueue(order("o-1"), status("delivered")).await.unwrap();
        // a stale deadline on an operation that cannot go first
        h.store
            .update(
                &behind.id,
                OperationPatch::retry(1, now, now - chrono::Duration::minutes(5), "HTTP 503"),
            )
            .await
            .unwrap();

        let report = h.engine.flush(&DispatchLane::ALL).await.unwrap();

        let expected = Some(now + chrono::Duration::minutes(1));
        assert_eq!(report.next_retry_at, expected);
        assert!(schedule.has_changed().unwrap());
        assert_eq!(*schedule.borrow_and_update(), expected);
        assert_eq!(h.engine.scheduled_retry(), expected);
        // read back from the store at millisecond precision
        assert_eq!(
            h.engine.next_retry_at().await.unwrap(),
            expected.map(|at| at.trunc_subsecs(3))
        );
    }
}
