pub mod ports;
pub mod services;

pub use services::{ConnectivityMonitor, LocalReadCache, OutboxEngine, SyncHandle, SyncOrchestrator};
