use crate::domain::entities::CachedEntity;
use crate::domain::value_objects::{EntityId, EntityType};
use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait EntityCacheStore: Send + Sync {
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, AppError>;
    async fn list(&self, entity_type: &EntityType) -> Result<Vec<CachedEntity>, AppError>;
    async fn upsert(&self, entity: &CachedEntity) -> Result<(), AppError>;
    async fn remove(&self, entity_type: &EntityType, entity_id: &EntityId)
    -> Result<bool, AppError>;
}
