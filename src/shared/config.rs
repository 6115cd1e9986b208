use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub request_timeout: u64,
    pub health_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Skip sync cycles while offline and keep local pending fields on pull.
    pub offline_first: bool,
    pub foreground_interval: u64,
    pub background_interval: u64,
    pub pull_path: String,
    pub entity_type: String,
    pub entity_id_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: u64,
    pub max_delay: u64,
    /// Treat 4xx responses like transient failures.
    pub retry_client_errors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub retention_days: u32,
    pub terminal_statuses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    pub probe_enabled: bool,
    pub probe_interval: u64,
    pub assume_online: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 5,
                connection_timeout: 30,
            },
            api: ApiConfig {
                base_url: "http://localhost:8080/api".to_string(),
                auth_token: None,
                request_timeout: 30,
                health_path: "/health".to_string(),
            },
            sync: SyncConfig {
                offline_first: true,
                foreground_interval: 300, // 5 minutes
                background_interval: 900, // 15 minutes
                pull_path: "/driver/jobs".to_string(),
                entity_type: "job".to_string(),
                entity_id_field: "id".to_string(),
            },
            retry: RetryConfig {
                max_attempts: 5,
                base_delay: 60,
                max_delay: 960, // 16 minutes
                retry_client_errors: false,
            },
            cache: CacheConfig {
                retention_days: 7,
                terminal_statuses: vec![
                    "delivered".to_string(),
                    "completed".to_string(),
                    "cancelled".to_string(),
                ],
            },
            connectivity: ConnectivityConfig {
                probe_enabled: true,
                probe_interval: 30,
                assume_online: true,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("COURIER_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("COURIER_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.max(1) as u32;
        }

        if let Ok(v) = std::env::var("COURIER_API_BASE_URL") {
            if !v.trim().is_empty() {
                cfg.api.base_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("COURIER_API_TOKEN") {
            cfg.api.auth_token = Some(v).filter(|token| !token.trim().is_empty());
        }
        if let Some(value) = env_u64("COURIER_API_TIMEOUT_SECS") {
            cfg.api.request_timeout = value.max(1);
        }

        if let Ok(v) = std::env::var("COURIER_OFFLINE_FIRST") {
            cfg.sync.offline_first = parse_bool(&v, cfg.sync.offline_first);
        }
        if let Some(value) = env_u64("COURIER_SYNC_INTERVAL_SECS") {
            cfg.sync.foreground_interval = value.max(1);
        }
        if let Some(value) = env_u64("COURIER_BACKGROUND_SYNC_INTERVAL_SECS") {
            cfg.sync.background_interval = value.max(1);
        }
        if let Ok(v) = std::env::var("COURIER_PULL_PATH") {
            if !v.trim().is_empty() {
                cfg.sync.pull_path = v.trim().to_string();
            }
        }

        if let Some(value) = env_u64("COURIER_MAX_ATTEMPTS") {
            cfg.retry.max_attempts = value.max(1) as u32;
        }
        if let Ok(v) = std::env::var("COURIER_RETRY_CLIENT_ERRORS") {
            cfg.retry.retry_client_errors = parse_bool(&v, cfg.retry.retry_client_errors);
        }

        if let Some(value) = env_u64("COURIER_CACHE_RETENTION_DAYS") {
            cfg.cache.retention_days = value as u32;
        }

        if let Ok(v) = std::env::var("COURIER_CONNECTIVITY_PROBE") {
            cfg.connectivity.probe_enabled = parse_bool(&v, cfg.connectivity.probe_enabled);
        }
        if let Some(value) = env_u64("COURIER_CONNECTIVITY_PROBE_SECS") {
            cfg.connectivity.probe_interval = value.max(1);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(format!(
                "API base_url must be an http(s) URL: {}",
                self.api.base_url
            ));
        }
        if self.api.request_timeout == 0 {
            return Err("API request_timeout must be greater than 0".to_string());
        }
        if !self.sync.pull_path.starts_with('/') {
            return Err("Sync pull_path must start with '/'".to_string());
        }
        if self.sync.foreground_interval == 0 || self.sync.background_interval == 0 {
            return Err("Sync intervals must be greater than 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("Retry max_attempts must be greater than 0".to_string());
        }
        if self.retry.base_delay == 0 || self.retry.max_delay < self.retry.base_delay {
            return Err("Retry max_delay must be at least base_delay (> 0)".to_string());
        }
        Ok(())
    }
}

fn default_database_url() -> String {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("./data"));
    let path = base.join("courier-sync").join("outbox.db");
    format!("sqlite:{}?mode=rwc", path.display())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
