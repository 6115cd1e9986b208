use super::queries::{
    COUNT_OPERATIONS_BY_STATUS, DELETE_ALL_OPERATIONS, DELETE_OPERATION, INSERT_OPERATION,
    RESET_IN_FLIGHT, SELECT_OPERATION_BY_ID, SELECT_OPERATION_COLUMNS,
};
use super::rows::OperationRow;
use crate::application::ports::OperationStore;
use crate::domain::entities::{OperationFilter, OperationPatch, QueuedOperation};
use crate::domain::value_objects::{OperationId, OperationStatus};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::warn;

/// SQLite-backed outbox. Every call commits before returning.
pub struct SqliteOperationStore {
    pool: ConnectionPool,
}

impl SqliteOperationStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    async fn insert(
        conn: &mut SqliteConnection,
        operation: &QueuedOperation,
    ) -> Result<i64, AppError> {
        let payload = serde_json::to_string(operation.payload.as_json())?;
        let result = sqlx::query(INSERT_OPERATION)
            .bind(operation.seq)
            .bind(operation.id.as_str())
            .bind(operation.kind.as_str())
            .bind(operation.target_entity_id.as_str())
            .bind(operation.endpoint.as_str())
            .bind(operation.method.as_str())
            .bind(payload)
            .bind(i64::from(operation.priority))
            .bind(i64::from(operation.attempts))
            .bind(i64::from(operation.max_attempts))
            .bind(operation.status.as_str())
            .bind(operation.created_at.timestamp_millis())
            .bind(operation.last_attempt_at.map(|at| at.timestamp_millis()))
            .bind(operation.next_retry_at.map(|at| at.timestamp_millis()))
            .bind(operation.last_error.as_deref())
            .execute(conn)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl OperationStore for SqliteOperationStore {
    async fn append(&self, mut operation: QueuedOperation) -> Result<QueuedOperation, AppError> {
        operation.seq = None;
        let mut conn = self.pool.get_pool().acquire().await?;
        let seq = Self::insert(&mut conn, &operation).await?;
        operation.seq = Some(seq);
        Ok(operation)
    }

    async fn list(&self, filter: OperationFilter) -> Result<Vec<QueuedOperation>, AppError> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_OPERATION_COLUMNS);
        builder.push(" WHERE 1 = 1");

        if let Some(statuses) = filter.statuses.as_ref().filter(|s| !s.is_empty()) {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(target) = filter.target_entity_id.as_ref() {
            builder.push(" AND target_entity_id = ");
            builder.push_bind(target.as_str().to_string());
        }
        if let Some(kinds) = filter.kinds.as_ref().filter(|k| !k.is_empty()) {
            builder.push(" AND kind IN (");
            let mut separated = builder.separated(", ");
            for kind in kinds {
                separated.push_bind(kind.as_str());
            }
            separated.push_unseparated(")");
        }

        builder.push(" ORDER BY seq ASC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::from(limit));
        }

        let rows = builder
            .build_query_as::<OperationRow>()
            .fetch_all(self.pool.get_pool())
            .await?;

        // an unreadable row only costs that operation
        let mut operations = Vec::with_capacity(rows.len());
        for row in rows {
            let seq = row.seq;
            match row.into_domain() {
                Ok(operation) => operations.push(operation),
                Err(err) => warn!(seq, error = %err, "skipping undecodable outbox row"),
            }
        }
        Ok(operations)
    }

    async fn get(&self, id: &OperationId) -> Result<Option<QueuedOperation>, AppError> {
        let row = sqlx::query_as::<_, OperationRow>(SELECT_OPERATION_BY_ID)
            .bind(id.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;
        row.map(OperationRow::into_domain).transpose()
    }

    async fn update(&self, id: &OperationId, patch: OperationPatch) -> Result<(), AppError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE outbox_operations SET ");
        let mut assignments = builder.separated(", ");
        if let Some(status) = patch.status {
            assignments.push("status = ");
            assignments.push_bind_unseparated(status.as_str());
        }
        if let Some(attempts) = patch.attempts {
            assignments.push("attempts = ");
            assignments.push_bind_unseparated(i64::from(attempts));
        }
        if let Some(last_attempt_at) = patch.last_attempt_at {
            assignments.push("last_attempt_at = ");
            assignments.push_bind_unseparated(last_attempt_at.map(|at| at.timestamp_millis()));
        }
        if let Some(next_retry_at) = patch.next_retry_at {
            assignments.push("next_retry_at = ");
            assignments.push_bind_unseparated(next_retry_at.map(|at| at.timestamp_millis()));
        }
        if let Some(last_error) = patch.last_error {
            assignments.push("last_error = ");
            assignments.push_bind_unseparated(last_error);
        }
        builder.push(" WHERE operation_id = ");
        builder.push_bind(id.as_str().to_string());

        let result = builder.build().execute(self.pool.get_pool()).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Operation not found: {id}")));
        }
        Ok(())
    }

    async fn remove(&self, id: &OperationId) -> Result<bool, AppError> {
        let result = sqlx::query(DELETE_OPERATION)
            .bind(id.as_str())
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_all(&self, operations: Vec<QueuedOperation>) -> Result<(), AppError> {
        let mut tx = self.pool.get_pool().begin().await?;
        sqlx::query(DELETE_ALL_OPERATIONS).execute(&mut *tx).await?;
        for operation in &operations {
            Self::insert(&mut *tx, operation).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self, status: OperationStatus) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar(COUNT_OPERATIONS_BY_STATUS)
            .bind(status.as_str())
            .fetch_one(self.pool.get_pool())
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn reset_in_flight(&self) -> Result<u64, AppError> {
        let result = sqlx::query(RESET_IN_FLIGHT)
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected())
    }
}
