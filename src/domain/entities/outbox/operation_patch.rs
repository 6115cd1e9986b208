use crate::domain::value_objects::OperationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partial update of a stored operation. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationPatch {
    pub status: Option<OperationStatus>,
    pub attempts: Option<u32>,
    pub last_attempt_at: Option<Option<DateTime<Utc>>>,
    pub next_retry_at: Option<Option<DateTime<Utc>>>,
    pub last_error: Option<Option<String>>,
}

impl OperationPatch {
    pub fn in_flight(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(OperationStatus::InFlight),
            last_attempt_at: Some(Some(at)),
            ..Self::default()
        }
    }

    pub fn retry(
        attempts: u32,
        attempted_at: DateTime<Utc>,
        next_retry_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: Some(OperationStatus::Pending),
            attempts: Some(attempts),
            last_attempt_at: Some(Some(attempted_at)),
            next_retry_at: Some(Some(next_retry_at)),
            last_error: Some(Some(error.into())),
        }
    }

    pub fn failed(attempts: u32, attempted_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: Some(OperationStatus::Failed),
            attempts: Some(attempts),
            last_attempt_at: Some(Some(attempted_at)),
            next_retry_at: Some(None),
            last_error: Some(Some(error.into())),
        }
    }

    /// Back to pending without touching the retry bookkeeping.
    pub fn pending() -> Self {
        Self {
            status: Some(OperationStatus::Pending),
            ..Self::default()
        }
    }

    /// Manual re-arm of a failed operation.
    pub fn rearm() -> Self {
        Self {
            status: Some(OperationStatus::Pending),
            attempts: Some(0),
            next_retry_at: Some(None),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
