pub mod cache;
pub mod outbox;

pub use cache::CachedEntity;
pub use outbox::{
    BusinessAction, FlushReport, OperationFilter, OperationPatch, OperationRequest, PhotoUpload,
    QueuedOperation, ScanRecord, ShiftPunch, StatusChange, StatusChangeWithScans,
};
