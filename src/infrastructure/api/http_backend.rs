use crate::application::ports::{ApiRequest, ApiResponse, BackendApi, DispatchError};
use crate::domain::value_objects::HttpMethod;
use crate::shared::config::ApiConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
const MAX_ERROR_BODY: usize = 500;

/// JSON-over-HTTP backend client.
pub struct HttpBackendApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackendApi {
    pub fn new(config: &ApiConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.auth_token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|err| {
                AppError::ConfigurationError(format!("Invalid API token: {err}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout.max(1)))
            .build()
            .map_err(|err| AppError::ConfigurationError(format!("HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, DispatchError> {
        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.ok().filter(|text| !text.is_empty());
        Err(DispatchError::Http {
            status: status.as_u16(),
            body: body.map(truncate),
        })
    }
}

#[async_trait]
impl BackendApi for HttpBackendApi {
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, DispatchError> {
        let url = self.url(request.endpoint.as_str());
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Patch => self.client.patch(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };
        if let Some(key) = request.idempotency_key.as_ref() {
            builder = builder.header(IDEMPOTENCY_HEADER, key.as_str());
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }

        let response = self.send(builder).await?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify)?;

        // the mutation is applied even when the body is not JSON
        let body = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => Some(value),
                Err(err) => {
                    debug!(url = %url, error = %err, "ignoring non-JSON response body");
                    None
                }
            }
        };
        Ok(ApiResponse { status, body })
    }

    async fn fetch_entities(&self, path: &str) -> Result<Vec<Value>, DispatchError> {
        let url = self.url(path);
        let response = self.send(self.client.get(&url)).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|err| DispatchError::Decode(err.to_string()))?;
        entity_list(body)
    }
}

/// Accepts a bare array or an envelope holding one under `data`, `items` or `jobs`.
fn entity_list(body: Value) -> Result<Vec<Value>, DispatchError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut envelope) => ["data", "items", "jobs"]
            .iter()
            .find_map(|key| match envelope.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| DispatchError::Decode("response holds no entity list".to_string())),
        other => Err(DispatchError::Decode(format!(
            "expected an entity list, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn classify(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Timeout
    } else if err.is_connect() || err.is_request() {
        DispatchError::Connection(err.to_string())
    } else if err.is_decode() || err.is_body() {
        DispatchError::Decode(err.to_string())
    } else {
        DispatchError::Other(err.to_string())
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_ERROR_BODY {
        return text;
    }
    let cut: String = text.chars().take(MAX_ERROR_BODY).collect();
    format!("{cut}... (truncated)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_list_accepts_bare_arrays_and_envelopes() {
        assert_eq!(entity_list(json!([{"id": 1}])).unwrap().len(), 1);
        assert_eq!(
            entity_list(json!({"data": [{"id": 1}, {"id": 2}]}))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(entity_list(json!({"jobs": []})).unwrap().len(), 0);
        assert!(matches!(
            entity_list(json!({"total": 3})),
            Err(DispatchError::Decode(_))
        ));
        assert!(matches!(
            entity_list(json!("nope")),
            Err(DispatchError::Decode(_))
        ));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY + 10);
        let truncated = truncate(body);
        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncate("short".into()), "short");
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let config = ApiConfig {
            base_url: "http://localhost:8080/api/".into(),
            auth_token: Some("secret".into()),
            request_timeout: 5,
            health_path: "/health".into(),
        };
        let api = HttpBackendApi::new(&config).unwrap();
        assert_eq!(api.url("/orders/1/status"), "http://localhost:8080/api/orders/1/status");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transient_failure() {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            auth_token: None,
            request_timeout: 2,
            health_path: "/health".into(),
        };
        let api = HttpBackendApi::new(&config).unwrap();
        let err = api.fetch_entities("/driver/jobs").await.unwrap_err();
        assert_eq!(
            err.failure_class(),
            crate::domain::FailureClass::Transient
        );
    }
}
