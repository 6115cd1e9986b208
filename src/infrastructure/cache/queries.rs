pub(super) const SELECT_ENTITY: &str = r#"
    SELECT entity_type,
           entity_id,
           data,
           sync_status,
           pending_fields,
           local_updated_at,
           server_synced_at,
           updated_at
    FROM cached_entities
    WHERE entity_type = ?1 AND entity_id = ?2
"#;

pub(super) const SELECT_ENTITIES_BY_TYPE: &str = r#"
    SELECT entity_type,
           entity_id,
           data,
           sync_status,
           pending_fields,
           local_updated_at,
           server_synced_at,
           updated_at
    FROM cached_entities
    WHERE entity_type = ?1
    ORDER BY entity_id ASC
"#;

pub(super) const UPSERT_ENTITY: &str = r#"
    INSERT INTO cached_entities (
        entity_type,
        entity_id,
        data,
        status_value,
        sync_status,
        pending_fields,
        local_updated_at,
        server_synced_at,
        updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(entity_type, entity_id) DO UPDATE SET
        data = excluded.data,
        status_value = excluded.status_value,
        sync_status = excluded.sync_status,
        pending_fields = excluded.pending_fields,
        local_updated_at = excluded.local_updated_at,
        server_synced_at = excluded.server_synced_at,
        updated_at = excluded.updated_at
"#;

pub(super) const DELETE_ENTITY: &str = r#"
    DELETE FROM cached_entities
    WHERE entity_type = ?1 AND entity_id = ?2
"#;
