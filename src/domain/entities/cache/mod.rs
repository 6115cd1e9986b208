pub mod cached_entity;

pub use cached_entity::CachedEntity;
