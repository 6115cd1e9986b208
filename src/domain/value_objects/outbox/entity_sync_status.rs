use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether unconfirmed local mutations are layered over a cached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntitySyncStatus {
    #[default]
    Synced,
    Pending,
}

impl EntitySyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitySyncStatus::Synced => "synced",
            EntitySyncStatus::Pending => "pending",
        }
    }

    pub fn from_value(value: &str) -> Self {
        match value {
            "pending" => EntitySyncStatus::Pending,
            _ => EntitySyncStatus::Synced,
        }
    }
}

impl fmt::Display for EntitySyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
