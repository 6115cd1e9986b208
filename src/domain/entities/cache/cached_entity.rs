use crate::domain::value_objects::{EntityId, EntitySyncStatus, EntityType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Locally held copy of a server entity with optimistic fields layered on top.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedEntity {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub data: Map<String, Value>,
    pub sync_status: EntitySyncStatus,
    /// Field names written locally and not yet confirmed by the server.
    pub pending_fields: BTreeSet<String>,
    pub local_updated_at: Option<DateTime<Utc>>,
    pub server_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CachedEntity {
    pub fn from_server(
        entity_type: EntityType,
        entity_id: EntityId,
        data: Map<String, Value>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            data,
            sync_status: EntitySyncStatus::Synced,
            pending_fields: BTreeSet::new(),
            local_updated_at: None,
            server_synced_at: Some(at),
            updated_at: at,
        }
    }

    pub fn from_optimistic(
        entity_type: EntityType,
        entity_id: EntityId,
        patch: &Map<String, Value>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut entity = Self {
            entity_type,
            entity_id,
            data: Map::new(),
            sync_status: EntitySyncStatus::Synced,
            pending_fields: BTreeSet::new(),
            local_updated_at: None,
            server_synced_at: None,
            updated_at: at,
        };
        entity.apply_optimistic(patch, at);
        entity
    }

    pub fn apply_optimistic(&mut self, patch: &Map<String, Value>, at: DateTime<Utc>) {
        for (field, value) in patch {
            self.data.insert(field.clone(), value.clone());
            self.pending_fields.insert(field.clone());
        }
        self.sync_status = EntitySyncStatus::Pending;
        self.local_updated_at = Some(self.local_updated_at.map_or(at, |prev| prev.max(at)));
        self.updated_at = at;
    }

    /// Fold a pulled server snapshot in. Pending fields keep their local values
    /// when `preserve_pending` is set.
    pub fn merge_pulled(
        &mut self,
        server: Map<String, Value>,
        at: DateTime<Utc>,
        preserve_pending: bool,
    ) {
        if preserve_pending && self.sync_status == EntitySyncStatus::Pending {
            let mut merged = server;
            for field in &self.pending_fields {
                match self.data.get(field) {
                    Some(local) => {
                        merged.insert(field.clone(), local.clone());
                    }
                    None => {
                        merged.remove(field);
                    }
                }
            }
            self.data = merged;
        } else {
            self.data = server;
            self.pending_fields.clear();
            self.sync_status = EntitySyncStatus::Synced;
        }
        self.server_synced_at = Some(at);
        self.updated_at = at;
    }

    /// Apply the body of a confirmed mutation. Server fields win unless
    /// `keep_pending` says newer local work is still outstanding.
    pub fn reconcile(
        &mut self,
        server: Option<&Map<String, Value>>,
        at: DateTime<Utc>,
        keep_pending: bool,
    ) {
        if keep_pending {
            if let Some(server) = server {
                for (field, value) in server {
                    if !self.pending_fields.contains(field) {
                        self.data.insert(field.clone(), value.clone());
                    }
                }
            }
        } else {
            if let Some(server) = server {
                for (field, value) in server {
                    self.data.insert(field.clone(), value.clone());
                }
            }
            self.pending_fields.clear();
            self.sync_status = EntitySyncStatus::Synced;
        }
        self.server_synced_at = Some(at);
        self.updated_at = at;
    }

    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.pending_fields.clear();
        self.sync_status = EntitySyncStatus::Synced;
        self.updated_at = at;
    }

    pub fn has_local_edit_after(&self, instant: DateTime<Utc>) -> bool {
        self.local_updated_at.is_some_and(|edited| edited > instant)
    }

    pub fn status_value(&self) -> Option<&str> {
        self.data.get("status").and_then(Value::as_str)
    }

    /// Synced, in a terminal business status and untouched since `cutoff`.
    pub fn is_purgeable(&self, cutoff: DateTime<Utc>, terminal_statuses: &[String]) -> bool {
        self.sync_status == EntitySyncStatus::Synced
            && self.updated_at < cutoff
            && self
                .status_value()
                .is_some_and(|status| terminal_statuses.iter().any(|t| t == status))
    }
}
