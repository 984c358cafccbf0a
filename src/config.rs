//! Client configuration: endpoint and credentials loaded from ~/.podio/client.yaml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PodioError, Result};
use crate::session::ConnectOptions;

pub const DEFAULT_ENDPOINT: &str = "wss://podio.poxate.com/compile";

/// Client configuration loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint of the compile service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key appended to the connection URI.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How often a blocked read wakes up to check for cancellation.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl ClientConfig {
    /// Standard config path (~/.podio/client.yaml).
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".podio").join("client.yaml"))
    }

    /// Load config from the standard path.
    /// Returns None if the file doesn't exist or can't be parsed.
    pub fn load() -> Option<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path).ok()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PodioError::Config(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| PodioError::Config(format!("{}: {e}", path.display())))
    }

    /// Override fields from `PODIO_API_KEY` and `PODIO_ENDPOINT`.
    pub fn apply_env(self) -> Self {
        self.with_overrides(
            std::env::var("PODIO_API_KEY").ok(),
            std::env::var("PODIO_ENDPOINT").ok(),
        )
    }

    fn with_overrides(mut self, api_key: Option<String>, endpoint: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            self.api_key = key;
        }
        if let Some(endpoint) = endpoint.filter(|e| !e.is_empty()) {
            self.endpoint = endpoint;
        }
        self
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
