pub mod backend_api;
pub mod connectivity;
pub mod entity_cache_store;
pub mod operation_store;

pub use backend_api::{ApiRequest, ApiResponse, BackendApi, DispatchError};
pub use connectivity::ReachabilityProbe;
pub use entity_cache_store::EntityCacheStore;
pub use operation_store::OperationStore;
