use crate::domain::entities::{OperationFilter, OperationPatch, QueuedOperation};
use crate::domain::value_objects::{OperationId, OperationStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// Crash-durable table of queued operations.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Persist a new operation; the returned copy carries its insertion `seq`.
    async fn append(&self, operation: QueuedOperation) -> Result<QueuedOperation, AppError>;
    /// Matching operations in insertion order.
    async fn list(&self, filter: OperationFilter) -> Result<Vec<QueuedOperation>, AppError>;
    async fn get(&self, id: &OperationId) -> Result<Option<QueuedOperation>, AppError>;
    async fn update(&self, id: &OperationId, patch: OperationPatch) -> Result<(), AppError>;
    async fn remove(&self, id: &OperationId) -> Result<bool, AppError>;
    /// Atomically swap the whole table for `operations`, in the given order.
    async fn replace_all(&self, operations: Vec<QueuedOperation>) -> Result<(), AppError>;
    async fn count(&self, status: OperationStatus) -> Result<u64, AppError>;
    /// Return rows left `in_flight` by an interrupted process to `pending`.
    async fn reset_in_flight(&self) -> Result<u64, AppError>;
}
