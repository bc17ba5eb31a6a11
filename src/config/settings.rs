//! Client configuration.
//!
//! Sources, lowest priority first: built-in defaults, the JSON file at
//! `$XDG_CONFIG_HOME/chatrelay/config.json`, `CHATRELAY_*` environment
//! variables, then whatever the CLI layers on top.

use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::xdg::XdgDirs;

pub const ENV_API_URL: &str = "CHATRELAY_API_URL";
pub const ENV_WS_URL: &str = "CHATRELAY_WS_URL";
pub const ENV_CONNECT_TIMEOUT: &str = "CHATRELAY_CONNECT_TIMEOUT";
pub const ENV_TRANSPORT: &str = "CHATRELAY_TRANSPORT";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// How continuation messages reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Persistent connection, token-by-token replies.
    #[default]
    Streaming,
    /// Every message is a single HTTP request.
    OneShot,
}

impl std::str::FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "streaming" | "ws" | "websocket" => Ok(TransportMode::Streaming),
            "one_shot" | "oneshot" | "http" => Ok(TransportMode::OneShot),
            _ => Err(ConfigError::InvalidValue {
                field: "transport",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Streaming => write!(f, "streaming"),
            TransportMode::OneShot => write!(f, "one_shot"),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    120
}

/// Everything a chat session needs to reach its backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// HTTP base of the backend
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Streaming base; derived from `base_url` when absent
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Deadline for the streaming connection to open
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Deadline for one-shot HTTP requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub transport: TransportMode,
    /// Ask the backend to drop the thread when starting a new conversation
    #[serde(default)]
    pub clear_remote_on_reset: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            transport: TransportMode::default(),
            clear_remote_on_reset: false,
        }
    }
}

impl ClientConfig {
    /// Defaults, then the XDG config file, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = XdgDirs::new().config_file();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Overlay `CHATRELAY_*` variables as reported by `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_API_URL) {
            self.base_url = url;
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            self.ws_url = Some(url);
        }
        if let Some(secs) = lookup(ENV_CONNECT_TIMEOUT) {
            self.connect_timeout_secs =
                secs.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: "connect_timeout_secs",
                        value: secs.clone(),
                    })?;
        }
        if let Some(mode) = lookup(ENV_TRANSPORT) {
            self.transport = mode.parse()?;
        }
        Ok(())
    }

    /// Check that both endpoints parse and the timeouts are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http_url()?;
        self.stream_url()?;
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_secs",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Parsed HTTP base.
    pub fn http_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl {
            field: "base_url",
            value: self.base_url.clone(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(ConfigError::InvalidUrl {
                field: "base_url",
                value: self.base_url.clone(),
            }),
        }
    }

    /// Streaming base: `ws_url` if set, else `base_url` with `http` → `ws`
    /// and `https` → `wss`.
    pub fn stream_url(&self) -> Result<Url, ConfigError> {
        let invalid = |value: &str| ConfigError::InvalidUrl {
            field: "ws_url",
            value: value.to_string(),
        };

        if let Some(ws) = &self.ws_url {
            let url = Url::parse(ws).map_err(|_| invalid(ws))?;
            return match url.scheme() {
                "ws" | "wss" => Ok(url),
                _ => Err(invalid(ws)),
            };
        }

        let mut url = self.http_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| invalid(&self.base_url))?;
        Ok(url)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
