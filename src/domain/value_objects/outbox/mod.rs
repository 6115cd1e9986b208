pub mod endpoint;
pub mod entity_id;
pub mod entity_sync_status;
pub mod operation_id;
pub mod operation_kind;
pub mod operation_status;
pub mod payload;

pub use endpoint::{ApiEndpoint, HttpMethod};
pub use entity_id::{EntityId, EntityType};
pub use entity_sync_status::EntitySyncStatus;
pub use operation_id::OperationId;
pub use operation_kind::{DispatchLane, OperationKind};
pub use operation_status::OperationStatus;
pub use payload::OperationPayload;
