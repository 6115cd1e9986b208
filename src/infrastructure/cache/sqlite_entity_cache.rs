use super::queries::{DELETE_ENTITY, SELECT_ENTITIES_BY_TYPE, SELECT_ENTITY, UPSERT_ENTITY};
use crate::application::ports::EntityCacheStore;
use crate::domain::entities::CachedEntity;
use crate::domain::value_objects::{EntityId, EntitySyncStatus, EntityType};
use crate::infrastructure::database::{ConnectionPool, from_millis};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::collections::BTreeSet;

#[derive(Debug, FromRow)]
struct CachedEntityRow {
    entity_type: String,
    entity_id: String,
    data: String,
    sync_status: String,
    pending_fields: String,
    local_updated_at: Option<i64>,
    server_synced_at: Option<i64>,
    updated_at: i64,
}

impl CachedEntityRow {
    fn into_domain(self) -> Result<CachedEntity, AppError> {
        let data: Map<String, Value> = serde_json::from_str(&self.data)?;
        let pending_fields: BTreeSet<String> = serde_json::from_str(&self.pending_fields)?;

        Ok(CachedEntity {
            entity_type: EntityType::new(self.entity_type).map_err(AppError::DeserializationError)?,
            entity_id: EntityId::new(self.entity_id).map_err(AppError::DeserializationError)?,
            data,
            sync_status: EntitySyncStatus::from_value(&self.sync_status),
            pending_fields,
            local_updated_at: self.local_updated_at.map(from_millis).transpose()?,
            server_synced_at: self.server_synced_at.map(from_millis).transpose()?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

/// Persistent read cache keyed by `(entity_type, entity_id)`.
pub struct SqliteEntityCache {
    pool: ConnectionPool,
}

impl SqliteEntityCache {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityCacheStore for SqliteEntityCache {
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, AppError> {
        let row = sqlx::query_as::<_, CachedEntityRow>(SELECT_ENTITY)
            .bind(entity_type.as_str())
            .bind(entity_id.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;
        row.map(CachedEntityRow::into_domain).transpose()
    }

    async fn list(&self, entity_type: &EntityType) -> Result<Vec<CachedEntity>, AppError> {
        let rows = sqlx::query_as::<_, CachedEntityRow>(SELECT_ENTITIES_BY_TYPE)
            .bind(entity_type.as_str())
            .fetch_all(self.pool.get_pool())
            .await?;
        rows.into_iter().map(CachedEntityRow::into_domain).collect()
    }

    async fn upsert(&self, entity: &CachedEntity) -> Result<(), AppError> {
        let data = serde_json::to_string(&entity.data)?;
        let pending_fields = serde_json::to_string(&entity.pending_fields)?;

        sqlx::query(UPSERT_ENTITY)
            .bind(entity.entity_type.as_str())
            .bind(entity.entity_id.as_str())
            .bind(data)
            .bind(entity.status_value())
            .bind(entity.sync_status.as_str())
            .bind(pending_fields)
            .bind(entity.local_updated_at.map(|at| at.timestamp_millis()))
            .bind(entity.server_synced_at.map(|at| at.timestamp_millis()))
            .bind(entity.updated_at.timestamp_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn remove(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(DELETE_ENTITY)
            .bind(entity_type.as_str())
            .bind(entity_id.as_str())
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
