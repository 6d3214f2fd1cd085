//! Client configuration.

use std::path::Path;

use foldwise_core::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};

/// Connection settings for the tracking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the service API.
    #[serde(default = "default_server_url")]
    pub url: String,

    /// API key, sent as the `api_key` query parameter.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Page size used when listing runs without an explicit page.
    #[serde(default = "default_list_batch_size")]
    pub list_batch_size: u64,
}

fn default_server_url() -> String {
    "https://tracking.foldwise.dev/api/v1/json".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_list_batch_size() -> u64 {
    10_000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            api_key: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            list_batch_size: default_list_batch_size(),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `FOLDWISE_SERVER_URL` | Service base URL |
    /// | `FOLDWISE_API_KEY` | API key |
    /// | `FOLDWISE_TIMEOUT` | Request timeout in seconds |
    /// | `FOLDWISE_MAX_RETRIES` | Max retries for transient failures |
    /// | `FOLDWISE_LIST_BATCH_SIZE` | Listing page size |
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("FOLDWISE_SERVER_URL").unwrap_or_else(|_| default_server_url()),
            api_key: std::env::var("FOLDWISE_API_KEY").ok(),
            timeout_secs: std::env::var("FOLDWISE_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("FOLDWISE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_retries),
            list_batch_size: std::env::var("FOLDWISE_LIST_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&size: &u64| size > 0)
                .unwrap_or_else(default_list_batch_size),
        }
    }

    /// Load config from a YAML file. Absent keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> ServiceResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ServiceError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|e| ServiceError::Config {
            message: format!("invalid config {}: {}", path.display(), e),
        })?;
        if config.list_batch_size == 0 {
            return Err(ServiceError::Config {
                message: "list_batch_size must be positive".to_string(),
            });
        }
        Ok(config)
    }

    /// Set the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_list_batch_size(mut self, list_batch_size: u64) -> Self {
        self.list_batch_size = list_batch_size.max(1);
        self
    }
}
