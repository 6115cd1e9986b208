use crate::application::ports::ReachabilityProbe;
use crate::shared::config::ApiConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Treats any HTTP response from the health endpoint as "online".
pub struct HttpReachabilityProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpReachabilityProbe {
    pub fn new(config: &ApiConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|err| AppError::ConfigurationError(format!("HTTP client: {err}")))?;
        Ok(Self {
            client,
            url: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                config.health_path
            ),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                trace!(status = response.status().as_u16(), "health probe answered");
                true
            }
            Err(err) => {
                trace!(error = %err, "health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            auth_token: None,
            request_timeout: 2,
            health_path: "/health".into(),
        };
        let probe = HttpReachabilityProbe::new(&config).unwrap();
        assert!(!probe.is_reachable().await);
    }
}
