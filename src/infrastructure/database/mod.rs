pub mod connection_pool;
mod timestamp;

pub use connection_pool::ConnectionPool;
pub use timestamp::from_millis;
