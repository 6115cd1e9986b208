use super::OperationPatch;
use crate::domain::value_objects::{
    ApiEndpoint, DispatchLane, EntityId, EntityType, HttpMethod, OperationId, OperationKind,
    OperationPayload, OperationStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Durable record of one pending mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedOperation {
    pub id: OperationId,
    /// Insertion sequence assigned by the store; `None` until appended.
    pub seq: Option<i64>,
    pub kind: OperationKind,
    pub target_entity_id: EntityId,
    pub endpoint: ApiEndpoint,
    pub method: HttpMethod,
    pub payload: OperationPayload,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl QueuedOperation {
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        kind: OperationKind,
        target_entity_id: EntityId,
        endpoint: ApiEndpoint,
        method: HttpMethod,
        payload: OperationPayload,
        priority: i32,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OperationId::generate(),
            seq: None,
            kind,
            target_entity_id,
            endpoint,
            method,
            payload,
            priority,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            status: OperationStatus::Pending,
            created_at,
            last_attempt_at: None,
            next_retry_at: None,
            last_error: None,
        }
    }

    pub fn lane(&self) -> DispatchLane {
        self.kind.lane()
    }

    pub fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }

    /// Retry delay has elapsed (or was never set).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now)
    }

    /// Dispatch order: lowest priority, then insertion order.
    pub fn dispatch_key(&self) -> (i32, i64) {
        (self.priority, self.seq.unwrap_or(i64::MAX))
    }

    pub fn apply(&mut self, patch: &OperationPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempts) = patch.attempts {
            self.attempts = attempts;
        }
        if let Some(last_attempt_at) = patch.last_attempt_at {
            self.last_attempt_at = last_attempt_at;
        }
        if let Some(next_retry_at) = patch.next_retry_at {
            self.next_retry_at = next_retry_at;
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error = last_error.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sample() -> QueuedOperation {
        QueuedOperation::new_pending(
            OperationKind::StatusUpdate,
            EntityId::new("order-1".into()).unwrap(),
            ApiEndpoint::new("/orders/order-1/status".into()).unwrap(),
            HttpMethod::Patch,
            OperationPayload::new(json!({"status": "picked_up"})).unwrap(),
            0,
            DEFAULT_MAX_ATTEMPTS,
            Utc::now(),
        )
    }

    #[test]
    fn new_operation_is_pending_and_due() {
        let op = sample();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempts, 0);
        assert!(op.is_due(op.created_at));
    }

    #[test]
    fn retry_patch_defers_dispatch() {
        let mut op = sample();
        let now = Utc::now();
        op.apply(&OperationPatch::retry(
            1,
            now,
            now + Duration::minutes(1),
            "HTTP 503",
        ));
        assert_eq!(op.attempts, 1);
        assert!(!op.is_due(now));
        assert!(op.is_due(now + Duration::minutes(1)));
        assert_eq!(op.last_error.as_deref(), Some("HTTP 503"));
    }
}
