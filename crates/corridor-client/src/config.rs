//! Client configuration.
//!
//! Defaults come from [`constants`](crate::constants); an optional RON file
//! overrides any subset of fields:
//!
//! ```ron
//! (
//!     base_url: "https://corridor.example",
//!     reconnect_delay_ms: 2000,
//! )
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::constants::{
    CONFIG_FILE, DEFAULT_BASE_URL, HEARTBEAT_INCOMING, HEARTBEAT_OUTGOING, PUSH_PATH,
    RECONNECT_DELAY, REQUEST_TIMEOUT, SNAPSHOT_DESTINATION, TEXT_DESTINATION,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid base url {0:?}: {1}")]
    BaseUrl(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// HTTP origin of the backend, e.g. `http://localhost:8080`.
    pub base_url: String,
    pub push_path: String,
    pub subscribe_destination: String,
    pub text_destination: String,
    pub reconnect_delay_ms: u64,
    pub heartbeat_incoming_ms: u64,
    pub heartbeat_outgoing_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            push_path: PUSH_PATH.into(),
            subscribe_destination: SNAPSHOT_DESTINATION.into(),
            text_destination: TEXT_DESTINATION.into(),
            reconnect_delay_ms: RECONNECT_DELAY.as_millis() as u64,
            heartbeat_incoming_ms: HEARTBEAT_INCOMING.as_millis() as u64,
            heartbeat_outgoing_ms: HEARTBEAT_OUTGOING.as_millis() as u64,
            request_timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ClientConfig {
    /// `$CONFIG_DIR/corridor/client.ron`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("corridor").join(CONFIG_FILE))
    }

    pub fn from_ron(source: &str, path: &Path) -> Result<Self, ConfigError> {
        ron::from_str(source).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&source, path)
    }

    /// Load from the default path when it exists, otherwise defaults.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url)
            .map_err(|e| ConfigError::BaseUrl(self.base_url.clone(), e.to_string()))
    }

    /// Absolute HTTP URL for an API path.
    pub fn http_url(&self, path: &str) -> Result<Url, ConfigError> {
        self.base()?
            .join(path)
            .map_err(|e| ConfigError::BaseUrl(self.base_url.clone(), e.to_string()))
    }

    /// Push channel URL: same host, `ws`/`wss` matching `http`/`https`.
    pub fn push_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.http_url(&self.push_path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| {
            ConfigError::BaseUrl(self.base_url.clone(), "cannot derive ws scheme".into())
        })?;
        Ok(url)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
