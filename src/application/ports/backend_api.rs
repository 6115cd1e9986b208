use crate::domain::FailureClass;
use crate::domain::value_objects::{ApiEndpoint, HttpMethod, OperationId};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub endpoint: ApiEndpoint,
    pub body: Option<Value>,
    /// Sent so the backend can drop duplicate deliveries.
    pub idempotency_key: Option<OperationId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn ok(body: Option<Value>) -> Self {
        Self { status: 200, body }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}{}", body_suffix(.body))]
    Http { status: u16, body: Option<String> },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl DispatchError {
    /// 4xx other than 408 and 429 means the request itself was rejected.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            DispatchError::Http { status, .. }
                if (400..500).contains(status) && *status != 408 && *status != 429 =>
            {
                FailureClass::Permanent
            }
            DispatchError::Timeout
            | DispatchError::Connection(_)
            | DispatchError::Http { .. }
            | DispatchError::Decode(_)
            | DispatchError::Other(_) => FailureClass::Transient,
        }
    }
}

fn body_suffix(body: &Option<String>) -> String {
    body.as_deref()
        .map(|text| format!(": {text}"))
        .unwrap_or_default()
}

/// Remote REST backend that owns authoritative entity state.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, DispatchError>;
    async fn fetch_entities(&self, path: &str) -> Result<Vec<Value>, DispatchError>;
}
