use crate::domain::value_objects::{
    ApiEndpoint, EntityId, HttpMethod, OperationKind, OperationPayload,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbology: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeWithScans {
    #[serde(flatten)]
    pub change: StatusChange,
    pub scans: Vec<ScanRecord>,
}

/// Upsell and other order-level business actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusinessAction {
    pub action: String,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    #[serde(rename = "dataBase64", with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShiftPunch {
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Typed enqueue surface: one variant per [`OperationKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    StatusUpdate(StatusChange),
    StatusUpdateWithScan(StatusChangeWithScans),
    BusinessAction(BusinessAction),
    BinaryUpload(PhotoUpload),
    Scan(ScanRecord),
    ClockIn(ShiftPunch),
    ClockOut(ShiftPunch),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::StatusUpdate(_) => OperationKind::StatusUpdate,
            OperationRequest::StatusUpdateWithScan(_) => OperationKind::StatusUpdateWithScan,
            OperationRequest::BusinessAction(_) => OperationKind::BusinessAction,
            OperationRequest::BinaryUpload(_) => OperationKind::BinaryUpload,
            OperationRequest::Scan(_) => OperationKind::Scan,
            OperationRequest::ClockIn(_) => OperationKind::ClockIn,
            OperationRequest::ClockOut(_) => OperationKind::ClockOut,
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            OperationRequest::StatusUpdate(_) | OperationRequest::StatusUpdateWithScan(_) => {
                HttpMethod::Patch
            }
            OperationRequest::BusinessAction(_)
            | OperationRequest::BinaryUpload(_)
            | OperationRequest::Scan(_)
            | OperationRequest::ClockIn(_)
            | OperationRequest::ClockOut(_) => HttpMethod::Post,
        }
    }

    pub fn endpoint(&self, target: &EntityId) -> Result<ApiEndpoint, AppError> {
        let path = match self {
            OperationRequest::StatusUpdate(_) | OperationRequest::StatusUpdateWithScan(_) => {
                format!("/orders/{target}/status")
            }
            OperationRequest::BusinessAction(_) => format!("/orders/{target}/actions"),
            OperationRequest::BinaryUpload(_) => format!("/orders/{target}/photos"),
            OperationRequest::Scan(_) => format!("/orders/{target}/scans"),
            OperationRequest::ClockIn(_) => format!("/drivers/{target}/clock-in"),
            OperationRequest::ClockOut(_) => format!("/drivers/{target}/clock-out"),
        };
        ApiEndpoint::new(path).map_err(AppError::ValidationError)
    }

    pub fn payload(&self) -> Result<OperationPayload, AppError> {
        let value = match self {
            OperationRequest::StatusUpdate(change) => serde_json::to_value(change)?,
            OperationRequest::StatusUpdateWithScan(change) => serde_json::to_value(change)?,
            OperationRequest::BusinessAction(action) => serde_json::to_value(action)?,
            OperationRequest::BinaryUpload(photo) => serde_json::to_value(photo)?,
            OperationRequest::Scan(scan) => serde_json::to_value(scan)?,
            OperationRequest::ClockIn(punch) | OperationRequest::ClockOut(punch) => {
                serde_json::to_value(punch)?
            }
        };
        OperationPayload::new(value).map_err(AppError::ValidationError)
    }

    /// Fields written into the read cache the moment the action is taken.
    pub fn optimistic_patch(&self) -> Option<Value> {
        match self {
            OperationRequest::StatusUpdate(change) => Some(json!({ "status": change.status })),
            OperationRequest::StatusUpdateWithScan(change) => {
                Some(json!({ "status": change.change.status }))
            }
            OperationRequest::ClockIn(_) => Some(json!({ "onShift": true })),
            OperationRequest::ClockOut(_) => Some(json!({ "onShift": false })),
            OperationRequest::BusinessAction(_)
            | OperationRequest::BinaryUpload(_)
            | OperationRequest::Scan(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            OperationRequest::StatusUpdate(change) => validate_status(&change.status),
            OperationRequest::StatusUpdateWithScan(change) => {
                validate_status(&change.change.status)?;
                if change.scans.is_empty() {
                    return Err(AppError::ValidationError(
                        "Status update with scan requires at least one scan".to_string(),
                    ));
                }
                change.scans.iter().try_for_each(validate_scan)
            }
            OperationRequest::BusinessAction(action) => {
                if action.action.trim().is_empty() {
                    return Err(AppError::ValidationError(
                        "Business action name cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
            OperationRequest::BinaryUpload(photo) => {
                if photo.data.is_empty() {
                    return Err(AppError::ValidationError(
                        "Upload payload cannot be empty".to_string(),
                    ));
                }
                if photo.file_name.trim().is_empty() {
                    return Err(AppError::ValidationError(
                        "Upload file name cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
            OperationRequest::Scan(scan) => validate_scan(scan),
            OperationRequest::ClockIn(_) | OperationRequest::ClockOut(_) => Ok(()),
        }
    }
}

fn validate_status(status: &str) -> Result<(), AppError> {
    if status.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Status cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_scan(scan: &ScanRecord) -> Result<(), AppError> {
    if scan.code.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Scan code cannot be empty".to_string(),
        ));
    }
    Ok(())
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
