pub(super) const SELECT_OPERATION_COLUMNS: &str = r#"
    SELECT seq,
           operation_id,
           kind,
           target_entity_id,
           endpoint,
           method,
           payload,
           priority,
           attempts,
           max_attempts,
           status,
           created_at,
           last_attempt_at,
           next_retry_at,
           last_error
    FROM outbox_operations
"#;

pub(super) const INSERT_OPERATION: &str = r#"
    INSERT INTO outbox_operations (
        seq,
        operation_id,
        kind,
        target_entity_id,
        endpoint,
        method,
        payload,
        priority,
        attempts,
        max_attempts,
        status,
        created_at,
        last_attempt_at,
        next_retry_at,
        last_error
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
"#;

pub(super) const SELECT_OPERATION_BY_ID: &str = r#"
    SELECT seq,
           operation_id,
           kind,
           target_entity_id,
           endpoint,
           method,
           payload,
           priority,
           attempts,
           max_attempts,
           status,
           created_at,
           last_attempt_at,
           next_retry_at,
           last_error
    FROM outbox_operations
    WHERE operation_id = ?1
"#;

pub(super) const DELETE_OPERATION: &str = r#"
    DELETE FROM outbox_operations
    WHERE operation_id = ?1
"#;

pub(super) const DELETE_ALL_OPERATIONS: &str = r#"
    DELETE FROM outbox_operations
"#;

pub(super) const COUNT_OPERATIONS_BY_STATUS: &str = r#"
    SELECT COUNT(*) FROM outbox_operations
    WHERE status = ?1
"#;

pub(super) const RESET_IN_FLIGHT: &str = r#"
    UPDATE outbox_operations
    SET status = 'pending'
    WHERE status = 'in_flight'
"#;
