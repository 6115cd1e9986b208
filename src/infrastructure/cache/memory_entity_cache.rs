use crate::application::ports::EntityCacheStore;
use crate::domain::entities::CachedEntity;
use crate::domain::value_objects::{EntityId, EntityType};
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type CacheKey = (EntityType, EntityId);

/// Volatile entity cache for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct MemoryEntityCache {
    entries: Arc<RwLock<HashMap<CacheKey, CachedEntity>>>,
}

impl MemoryEntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl EntityCacheStore for MemoryEntityCache {
    async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(entity_type.clone(), entity_id.clone()))
            .cloned())
    }

    async fn list(&self, entity_type: &EntityType) -> Result<Vec<CachedEntity>, AppError> {
        let entries = self.entries.read().await;
        let mut entities: Vec<CachedEntity> = entries
            .values()
            .filter(|entity| &entity.entity_type == entity_type)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(entities)
    }

    async fn upsert(&self, entity: &CachedEntity) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            (entity.entity_type.clone(), entity.entity_id.clone()),
            entity.clone(),
        );
        Ok(())
    }

    async fn remove(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(&(entity_type.clone(), entity_id.clone()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Map, json};

    #[tokio::test]
    async fn entities_are_keyed_by_type_and_id() {
        let cache = MemoryEntityCache::new();
        let id = EntityId::new("shared-1".into()).unwrap();
        let mut data = Map::new();
        data.insert("status".into(), json!("assigned"));

        cache
            .upsert(&CachedEntity::from_server(
                EntityType::job(),
                id.clone(),
                data.clone(),
                Utc::now(),
            ))
            .await
            .unwrap();
        cache
            .upsert(&CachedEntity::from_server(
                EntityType::driver(),
                id.clone(),
                data,
                Utc::now(),
            ))
            .await
            .unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.list(&EntityType::job()).await.unwrap().len(), 1);
        assert!(cache.remove(&EntityType::job(), &id).await.unwrap());
        assert!(!cache.remove(&EntityType::job(), &id).await.unwrap());
        assert!(cache.get(&EntityType::driver(), &id).await.unwrap().is_some());
    }
}
