use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one flush pass over the outbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub attempted: u32,
    pub completed: u32,
    pub retried: u32,
    pub failed: u32,
    /// Operations skipped because the store could not record their state.
    pub skipped: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl FlushReport {
    pub fn merge(&mut self, other: &FlushReport) {
        self.attempted += other.attempted;
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.next_retry_at = match (self.next_retry_at, other.next_retry_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}
