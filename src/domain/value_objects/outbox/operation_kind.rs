use super::EntityType;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Closed set of mutations the driver client can queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    StatusUpdate,
    StatusUpdateWithScan,
    BusinessAction,
    BinaryUpload,
    Scan,
    ClockIn,
    ClockOut,
}

/// Sync phase that drains a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchLane {
    Mutations,
    Attachments,
    Scans,
}

impl DispatchLane {
    pub const ALL: [DispatchLane; 3] = [
        DispatchLane::Mutations,
        DispatchLane::Attachments,
        DispatchLane::Scans,
    ];
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::StatusUpdate => "status_update",
            OperationKind::StatusUpdateWithScan => "status_update_with_scan",
            OperationKind::BusinessAction => "business_action",
            OperationKind::BinaryUpload => "binary_upload",
            OperationKind::Scan => "scan",
            OperationKind::ClockIn => "clock_in",
            OperationKind::ClockOut => "clock_out",
        }
    }

    /// Lower dispatches first; status-affecting work outranks uploads.
    pub fn default_priority(&self) -> i32 {
        match self {
            OperationKind::StatusUpdate | OperationKind::StatusUpdateWithScan => 0,
            OperationKind::ClockIn | OperationKind::ClockOut => 1,
            OperationKind::BusinessAction => 2,
            OperationKind::Scan => 3,
            OperationKind::BinaryUpload => 5,
        }
    }

    pub fn lane(&self) -> DispatchLane {
        match self {
            OperationKind::StatusUpdate
            | OperationKind::StatusUpdateWithScan
            | OperationKind::BusinessAction
            | OperationKind::ClockIn
            | OperationKind::ClockOut => DispatchLane::Mutations,
            OperationKind::BinaryUpload => DispatchLane::Attachments,
            OperationKind::Scan => DispatchLane::Scans,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            OperationKind::ClockIn | OperationKind::ClockOut => EntityType::driver(),
            OperationKind::StatusUpdate
            | OperationKind::StatusUpdateWithScan
            | OperationKind::BusinessAction
            | OperationKind::BinaryUpload
            | OperationKind::Scan => EntityType::job(),
        }
    }

    /// Whether a successful response is folded back into the read cache.
    pub fn reconciles_entity(&self) -> bool {
        match self {
            OperationKind::StatusUpdate
            | OperationKind::StatusUpdateWithScan
            | OperationKind::BusinessAction
            | OperationKind::ClockIn
            | OperationKind::ClockOut => true,
            OperationKind::BinaryUpload | OperationKind::Scan => false,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status_update" => Ok(OperationKind::StatusUpdate),
            "status_update_with_scan" => Ok(OperationKind::StatusUpdateWithScan),
            "business_action" => Ok(OperationKind::BusinessAction),
            "binary_upload" => Ok(OperationKind::BinaryUpload),
            "scan" => Ok(OperationKind::Scan),
            "clock_in" => Ok(OperationKind::ClockIn),
            "clock_out" => Ok(OperationKind::ClockOut),
            other => Err(format!("Unknown operation kind: {other}")),
        }
    }
}
