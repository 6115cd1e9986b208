pub mod entities;
pub mod retry_policy;
pub mod value_objects;

pub use entities::{CachedEntity, OperationRequest, QueuedOperation};
pub use retry_policy::{FailureClass, RetryDecision, RetryPolicy};
