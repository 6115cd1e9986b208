pub mod flush_report;
pub mod operation_filter;
pub mod operation_patch;
pub mod operation_request;
pub mod queued_operation;

pub use flush_report::FlushReport;
pub use operation_filter::OperationFilter;
pub use operation_patch::OperationPatch;
pub use operation_request::{
    BusinessAction, OperationRequest, PhotoUpload, ScanRecord, ShiftPunch, StatusChange,
    StatusChangeWithScans,
};
pub use queued_operation::{DEFAULT_MAX_ATTEMPTS, QueuedOperation};
