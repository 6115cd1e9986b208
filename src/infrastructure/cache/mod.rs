pub mod memory_entity_cache;
mod queries;
pub mod sqlite_entity_cache;

pub use memory_entity_cache::MemoryEntityCache;
pub use sqlite_entity_cache::SqliteEntityCache;
