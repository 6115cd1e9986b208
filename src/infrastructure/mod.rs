pub mod api;
pub mod cache;
pub mod connectivity;
pub mod database;
pub mod outbox;

pub use api::HttpBackendApi;
pub use cache::{MemoryEntityCache, SqliteEntityCache};
pub use connectivity::HttpReachabilityProbe;
pub use database::ConnectionPool;
pub use outbox::SqliteOperationStore;
