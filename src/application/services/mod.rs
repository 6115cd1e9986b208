pub mod connectivity_service;
pub mod outbox_service;
pub mod read_cache;
pub mod sync_service;

pub use connectivity_service::ConnectivityMonitor;
pub use outbox_service::OutboxEngine;
pub use read_cache::{LocalReadCache, PullSummary};
pub use sync_service::{
    SyncHandle, SyncOptions, SyncOrchestrator, SyncOutcome, SyncReport, SyncStatus, SyncTrigger,
};
