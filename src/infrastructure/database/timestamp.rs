use crate::shared::error::AppError;
use chrono::{DateTime, TimeZone, Utc};

/// Timestamps are stored as INTEGER milliseconds since the epoch.
pub fn from_millis(value: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_millis_opt(value)
        .single()
        .ok_or_else(|| AppError::DeserializationError(format!("Invalid timestamp: {value}")))
}
