//! Client configuration
//!
//! Defaults suit a local platform instance. Values can be loaded from a JSON
//! file and overridden from `SKILL_COMPOSE_*` environment variables.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection and behavior settings for the platform client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Platform base URL, without the `/api/v1` prefix
    pub base_url: String,

    /// Timeout for regular (non-streaming) requests, in seconds
    pub request_timeout_secs: u64,

    /// Connect timeout applied to every request, including streams
    pub connect_timeout_secs: u64,

    /// Channel adapter status polling interval, in seconds
    pub adapter_poll_interval_secs: u64,

    /// File holding per-surface session ids and auth tokens;
    /// `None` keeps them in memory only
    pub state_path: Option<PathBuf>,

    /// UI locale tag
    pub locale: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:62610".to_string(),
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
            adapter_poll_interval_secs: 30,
            state_path: None,
            locale: crate::i18n::DEFAULT_LOCALE.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            ClientError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = var("SKILL_COMPOSE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(v) = var("SKILL_COMPOSE_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_secs("SKILL_COMPOSE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("SKILL_COMPOSE_POLL_INTERVAL_SECS") {
            self.adapter_poll_interval_secs = parse_secs("SKILL_COMPOSE_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(path) = var("SKILL_COMPOSE_STATE_PATH") {
            self.state_path = Some(PathBuf::from(path));
        }
        if let Some(locale) = var("SKILL_COMPOSE_LOCALE") {
            self.locale = locale;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.adapter_poll_interval_secs == 0 {
            return Err(ClientError::Config(
                "adapter_poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// `{base_url}/api/v1` with any trailing slash removed
    pub fn api_base(&self) -> String {
        format!("{}/api/v1", self.base_url.trim().trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn adapter_poll_interval(&self) -> Duration {
        Duration::from_secs(self.adapter_poll_interval_secs)
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| ClientError::Config(format!("{} must be an integer, got '{}'", name, value)))
}
