pub mod metrics;
mod queries;
mod rows;
pub mod sqlite_store;

pub use metrics::{DispatchOutcomeMetadata, DispatchOutcomeStatus, OutboxMetrics, OutboxMetricsSnapshot};
pub use sqlite_store::SqliteOperationStore;
