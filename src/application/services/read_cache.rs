use crate::application::ports::EntityCacheStore;
use crate::domain::entities::CachedEntity;
use crate::domain::value_objects::{EntityId, EntityType};
use crate::shared::clock::Clock;
use crate::shared::config::CacheConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullSummary {
    pub received: u32,
    pub upserted: u32,
    /// Entities whose pending local fields survived the pull.
    pub preserved: u32,
    pub skipped: u32,
}

/// Latest known entity state for offline reads.
pub struct LocalReadCache {
    store: Arc<dyn EntityCacheStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    terminal_statuses: Vec<String>,
    // read-modify-write sequences must not interleave
    write_gate: Mutex<()>,
}

impl LocalReadCache {
    pub fn new(store: Arc<dyn EntityCacheStore>, clock: Arc<dyn Clock>) -> Self {
        let defaults = crate::shared::AppConfig::default().cache;
        Self::with_config(store, clock, &defaults)
    }

    pub fn with_config(
        store: Arc<dyn EntityCacheStore>,
        clock: Arc<dyn Clock>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            clock,
            retention: Duration::days(i64::from(config.retention_days)),
            terminal_statuses: config.terminal_statuses.clone(),
            write_gate: Mutex::new(()),
        }
    }

    pub async fn get(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<CachedEntity>, AppError> {
        self.store.get(entity_type, entity_id).await
    }

    pub async fn list<F>(
        &self,
        entity_type: &EntityType,
        predicate: F,
    ) -> Result<Vec<CachedEntity>, AppError>
    where
        F: Fn(&CachedEntity) -> bool,
    {
        let entities = self.store.list(entity_type).await?;
        Ok(entities.into_iter().filter(|e| predicate(e)).collect())
    }

    pub async fn upsert(&self, entity: CachedEntity) -> Result<(), AppError> {
        let _guard = self.write_gate.lock().await;
        self.store.upsert(&entity).await
    }

    /// Layer a local edit over the cached entity, creating it if needed.
    pub async fn apply_optimistic(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        patch: &Value,
        at: DateTime<Utc>,
    ) -> Result<CachedEntity, AppError> {
        let patch = patch.as_object().ok_or_else(|| {
            AppError::ValidationError("Optimistic patch must be a JSON object".to_string())
        })?;

        let _guard = self.write_gate.lock().await;
        let entity = match self.store.get(entity_type, entity_id).await? {
            Some(mut existing) => {
                existing.apply_optimistic(patch, at);
                existing
            }
            None => CachedEntity::from_optimistic(
                entity_type.clone(),
                entity_id.clone(),
                patch,
                at,
            ),
        };
        self.store.upsert(&entity).await?;
        debug!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            fields = ?patch.keys().collect::<Vec<_>>(),
            "optimistic update applied"
        );
        Ok(entity)
    }

    /// Fold a confirmed mutation's response body into the cache.
    ///
    /// Server fields win, except when a local edit newer than `dispatched_at`
    /// exists or `outstanding` says more local work is queued for the entity;
    /// then pending fields are kept and the entity stays pending.
    pub async fn reconcile(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
        body: Option<&Value>,
        dispatched_at: DateTime<Utc>,
        outstanding: bool,
    ) -> Result<Option<CachedEntity>, AppError> {
        let server = body.and_then(Value::as_object);
        let now = self.clock.now();

        let _guard = self.write_gate.lock().await;
        let entity = match self.store.get(entity_type, entity_id).await? {
            Some(mut existing) => {
                let keep_pending = outstanding || existing.has_local_edit_after(dispatched_at);
                existing.reconcile(server, now, keep_pending);
                existing
            }
            None => match server {
                Some(server) => CachedEntity::from_server(
                    entity_type.clone(),
                    entity_id.clone(),
                    server.clone(),
                    now,
                ),
                None => return Ok(None),
            },
        };
        self.store.upsert(&entity).await?;
        debug!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            sync_status = %entity.sync_status,
            "entity reconciled"
        );
        Ok(Some(entity))
    }

    /// Merge a pulled entity list. Items without a usable id are skipped.
    pub async fn merge_pulled(
        &self,
        entity_type: &EntityType,
        items: Vec<Value>,
        id_field: &str,
        preserve_pending: bool,
    ) -> Result<PullSummary, AppError> {
        let now = self.clock.now();
        let mut summary = PullSummary {
            received: items.len() as u32,
            ..PullSummary::default()
        };

        let _guard = self.write_gate.lock().await;
        for item in items {
            let Some((entity_id, data)) = split_entity(item, id_field) else {
                summary.skipped += 1;
                continue;
            };

            let entity = match self.store.get(entity_type, &entity_id).await? {
                Some(mut existing) => {
                    if preserve_pending && !existing.pending_fields.is_empty() {
                        summary.preserved += 1;
                    }
                    existing.merge_pulled(data, now, preserve_pending);
                    existing
                }
                None => CachedEntity::from_server(entity_type.clone(), entity_id, data, now),
            };
            self.store.upsert(&entity).await?;
            summary.upserted += 1;
        }

        if summary.skipped > 0 {
            warn!(
                entity_type = %entity_type,
                skipped = summary.skipped,
                "pulled items without an id were ignored"
            );
        }
        Ok(summary)
    }

    /// Drop local pending state, e.g. after its failed operation was purged.
    pub async fn mark_synced(
        &self,
        entity_type: &EntityType,
        entity_id: &EntityId,
    ) -> Result<(), AppError> {
        let _guard = self.write_gate.lock().await;
        if let Some(mut entity) = self.store.get(entity_type, entity_id).await? {
            entity.mark_synced(self.clock.now());
            self.store.upsert(&entity).await?;
        }
        Ok(())
    }

    /// Remove terminal, synced entities older than the retention window.
    pub async fn purge_expired(&self) -> Result<u32, AppError> {
        let cutoff = self.clock.now() - self.retention;
        let _guard = self.write_gate.lock().await;

        let mut removed = 0u32;
        for entity_type in [EntityType::job(), EntityType::driver()] {
            for entity in self.store.list(&entity_type).await? {
                if entity.is_purgeable(cutoff, &self.terminal_statuses)
                    && self
                        .store
                        .remove(&entity.entity_type, &entity.entity_id)
                        .await?
                {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }
}

fn split_entity(item: Value, id_field: &str) -> Option<(EntityId, Map<String, Value>)> {
    let Value::Object(data) = item else {
        return None;
    };
    let raw_id = match data.get(id_field)? {
        Value::String(value) => value.clone(),
        Value::Number(value) => value.to_string(),
        _ => return None,
    };
    let entity_id = EntityId::new(raw_id).ok()?;
    Some((entity_id, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::EntitySyncStatus;
    use crate::infrastructure::cache::MemoryEntityCache;
    use crate::shared::clock::ManualClock;
    use serde_json::json;

    fn setup() -> (LocalReadCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = LocalReadCache::new(Arc::new(MemoryEntityCache::new()), clock.clone());
        (cache, clock)
    }

    fn order(id: &str) -> EntityId {
        EntityId::new(id.into()).unwrap()
    }

    #[tokio::test]
    async fn optimistic_write_is_visible_immediately() {
        let (cache, clock) = setup();
        cache
            .apply_optimistic(
                &EntityType::job(),
                &order("o-1"),
                &json!({"status": "picked_up"}),
                clock.now(),
            )
            .await
            .unwrap();

        let entity = cache
            .get(&EntityType::job(), &order("o-1"))
            .await
            .unwrap()
            .expect("cached entity");
        assert_eq!(entity.status_value(), Some("picked_up"));
        assert_eq!(entity.sync_status, EntitySyncStatus::Pending);
    }

    #[tokio::test]
    async fn optimistic_patch_must_be_object() {
        let (cache, clock) = setup();
        let result = cache
            .apply_optimistic(&EntityType::job(), &order("o-1"), &json!("x"), clock.now())
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn merge_pulled_accepts_numeric_ids_and_skips_anonymous_items() {
        let (cache, _clock) = setup();
        let summary = cache
            .merge_pulled(
                &EntityType::job(),
                vec![
                    json!({"id": 17, "status": "assigned"}),
                    json!({"id": "o-2", "status": "assigned"}),
                    json!({"status": "orphan"}),
                    json!("garbage"),
                ],
                "id",
                true,
            )
            .await
            .unwrap();

        assert_eq!(summary.received, 4);
        assert_eq!(summary.upserted, 2);
        assert_eq!(summary.skipped, 2);
        assert!(
            cache
                .get(&EntityType::job(), &order("17"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn reconcile_twice_matches_reconcile_once() {
        let (cache, clock) = setup();
        let dispatched_at = clock.now();
        cache
            .apply_optimistic(
                &EntityType::job(),
                &order("o-1"),
                &json!({"status": "delivered"}),
                dispatched_at,
            )
            .await
            .unwrap();

        let body = json!({"status": "delivered", "deliveredAt": "2025-06-01T09:00:00Z"});
        let first = cache
            .reconcile(&EntityType::job(), &order("o-1"), Some(&body), dispatched_at, false)
            .await
            .unwrap();
        let second = cache
            .reconcile(&EntityType::job(), &order("o-1"), Some(&body), dispatched_at, false)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            second.unwrap().sync_status,
            EntitySyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn reconcile_does_not_clobber_newer_local_edit() {
        let (cache, clock) = setup();
        let first_edit = clock.now();
        cache
            .apply_optimistic(
                &EntityType::job(),
                &order("o-1"),
                &json!({"status": "picked_up"}),
                first_edit,
            )
            .await
            .unwrap();
        clock.advance(Duration::seconds(30));
        cache
            .apply_optimistic(
                &EntityType::job(),
                &order("o-1"),
                &json!({"status": "delivered"}),
                clock.now(),
            )
            .await
            .unwrap();

        let reconciled = cache
            .reconcile(
                &EntityType::job(),
                &order("o-1"),
                Some(&json!({"status": "picked_up", "eta": 4})),
                first_edit,
                false,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reconciled.status_value(), Some("delivered"));
        assert_eq!(reconciled.data["eta"], 4);
        assert_eq!(reconciled.sync_status, EntitySyncStatus::Pending);
    }

    #[tokio::test]
    async fn purge_removes_only_old_terminal_entities() {
        let (cache, clock) = setup();
        cache
            .merge_pulled(
                &EntityType::job(),
                vec![
                    json!({"id": "done", "status": "delivered"}),
                    json!({"id": "open", "status": "assigned"}),
                ],
                "id",
                true,
            )
            .await
            .unwrap();

        assert_eq!(cache.purge_expired().await.unwrap(), 0);

        clock.advance(Duration::days(8));
        assert_eq!(cache.purge_expired().await.unwrap(), 1);

        let remaining = cache.list(&EntityType::job(), |_| true).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_id.as_str(), "open");
    }
}
