use crate::domain::entities::QueuedOperation;
use crate::domain::value_objects::{
    ApiEndpoint, EntityId, HttpMethod, OperationId, OperationKind, OperationPayload,
    OperationStatus,
};
use crate::infrastructure::database::from_millis;
use crate::shared::error::AppError;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub(super) struct OperationRow {
    pub seq: i64,
    pub operation_id: String,
    pub kind: String,
    pub target_entity_id: String,
    pub endpoint: String,
    pub method: String,
    pub payload: String,
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub status: String,
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
}

impl OperationRow {
    pub(super) fn into_domain(self) -> Result<QueuedOperation, AppError> {
        let seq = self.seq;
        let invalid = |field: &str, err: String| {
            AppError::DeserializationError(format!("Invalid {field} in outbox row {seq}: {err}"))
        };

        Ok(QueuedOperation {
            id: OperationId::new(self.operation_id).map_err(|e| invalid("operation_id", e))?,
            seq: Some(seq),
            kind: self.kind.parse::<OperationKind>().map_err(|e| invalid("kind", e))?,
            target_entity_id: EntityId::new(self.target_entity_id)
                .map_err(|e| invalid("target_entity_id", e))?,
            endpoint: ApiEndpoint::new(self.endpoint).map_err(|e| invalid("endpoint", e))?,
            method: self.method.parse::<HttpMethod>().map_err(|e| invalid("method", e))?,
            payload: OperationPayload::from_json_str(&self.payload)
                .map_err(|e| invalid("payload", e))?,
            priority: self.priority as i32,
            attempts: self.attempts.max(0) as u32,
            max_attempts: self.max_attempts.max(1) as u32,
            status: self.status.parse::<OperationStatus>().map_err(|e| invalid("status", e))?,
            created_at: from_millis(self.created_at)?,
            last_attempt_at: self.last_attempt_at.map(from_millis).transpose()?,
            next_retry_at: self.next_retry_at.map(from_millis).transpose()?,
            last_error: self.last_error,
        })
    }
}
