use chrono::Utc;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcomeStatus {
    Delivered,
    Retried,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutboxMetricsSnapshot {
    pub total_delivered: u64,
    pub total_retried: u64,
    pub total_failed: u64,
    pub consecutive_failure: u64,
    pub last_delivered_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<DispatchOutcomeStatus>,
    pub last_operation_id: Option<String>,
    pub last_kind: Option<String>,
    pub last_entity_id: Option<String>,
    pub last_attempts: Option<u32>,
    pub last_max_attempts: Option<u32>,
    pub last_backoff_ms: Option<u64>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcomeMetadata {
    pub operation_id: Option<String>,
    pub kind: Option<String>,
    pub entity_id: Option<String>,
    pub attempts: Option<u32>,
    pub max_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Default, Clone)]
struct LastDispatch {
    outcome: Option<DispatchOutcomeStatus>,
    meta: DispatchOutcomeMetadata,
}

/// Per-engine dispatch counters plus details of the most recent attempt.
pub struct OutboxMetrics {
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    consecutive_failure: AtomicU64,
    last_delivered_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    last: Mutex<LastDispatch>,
}

impl Default for OutboxMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboxMetrics {
    pub fn new() -> Self {
        Self {
            delivered: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            last_delivered_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            last: Mutex::new(LastDispatch::default()),
        }
    }

    pub fn record(&self, status: DispatchOutcomeStatus, meta: DispatchOutcomeMetadata) {
        let now = current_unix_ms();
        match status {
            DispatchOutcomeStatus::Delivered => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.last_delivered_ms.store(now, Ordering::Relaxed);
                self.consecutive_failure.store(0, Ordering::Relaxed);
            }
            DispatchOutcomeStatus::Retried | DispatchOutcomeStatus::Failed => {
                let counter = if status == DispatchOutcomeStatus::Retried {
                    &self.retried
                } else {
                    &self.failed
                };
                counter.fetch_add(1, Ordering::Relaxed);
                self.last_failure_ms.store(now, Ordering::Relaxed);
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut guard) = self.last.lock() {
            guard.outcome = Some(status);
            guard.meta = meta;
        }
    }

    pub fn snapshot(&self) -> OutboxMetricsSnapshot {
        let last = self
            .last
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        OutboxMetricsSnapshot {
            total_delivered: self.delivered.load(Ordering::Relaxed),
            total_retried: self.retried.load(Ordering::Relaxed),
            total_failed: self.failed.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            last_delivered_ms: non_zero(self.last_delivered_ms.load(Ordering::Relaxed)),
            last_failure_ms: non_zero(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: last.outcome,
            last_operation_id: last.meta.operation_id,
            last_kind: last.meta.kind,
            last_entity_id: last.meta.entity_id,
            last_attempts: last.meta.attempts,
            last_max_attempts: last.meta.max_attempts,
            last_backoff_ms: last.meta.backoff_ms,
            last_duration_ms: last.meta.duration_ms,
            last_error: last.meta.error,
        }
    }
}

fn non_zero(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}

fn current_unix_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_accumulate_until_a_delivery() {
        let metrics = OutboxMetrics::new();
        metrics.record(
            DispatchOutcomeStatus::Retried,
            DispatchOutcomeMetadata {
                operation_id: Some("op-1".into()),
                attempts: Some(1),
                backoff_ms: Some(60_000),
                error: Some("HTTP 503".into()),
                ..DispatchOutcomeMetadata::default()
            },
        );
        metrics.record(DispatchOutcomeStatus::Failed, DispatchOutcomeMetadata::default());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_retried, 1);
        assert_eq!(snapshot.total_failed, 1);
        assert_eq!(snapshot.consecutive_failure, 2);
        assert!(snapshot.last_failure_ms.is_some());
        assert!(snapshot.last_delivered_ms.is_none());

        metrics.record(
            DispatchOutcomeStatus::Delivered,
            DispatchOutcomeMetadata {
                operation_id: Some("op-2".into()),
                duration_ms: Some(42),
                ..DispatchOutcomeMetadata::default()
            },
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_delivered, 1);
        assert_eq!(snapshot.consecutive_failure, 0);
        assert_eq!(snapshot.last_outcome, Some(DispatchOutcomeStatus::Delivered));
        assert_eq!(snapshot.last_operation_id.as_deref(), Some("op-2"));
        assert_eq!(snapshot.last_duration_ms, Some(42));
    }
}
