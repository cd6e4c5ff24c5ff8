//! Configuration schema and loader for the tablet manager client.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tmrpc_common::{RemoteEndpoint, TabletAlias};

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Deadline applied to a call when the caller gives none, in
    /// milliseconds. Zero means calls run without a deadline.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Channel capacity for streaming calls.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,

    /// Known tablets, by alias.
    #[serde(default)]
    pub tablets: Vec<TabletEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletEntry {
    /// Tablet alias in `<cell>-<uid>` form.
    pub alias: TabletAlias,

    /// `host:port` of the tablet's manager agent.
    pub addr: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            stream_buffer: default_stream_buffer(),
            metrics_port: None,
            tablets: Vec::new(),
        }
    }
}

// --- Defaults ---

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_stream_buffer() -> usize {
    10
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ClientConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_buffer == 0 {
            return Err(ConfigError::Invalid("stream_buffer must be > 0".into()));
        }
        let mut seen = HashSet::new();
        for entry in &self.tablets {
            if entry.addr.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "tablets.{}: addr must not be empty",
                    entry.alias
                )));
            }
            if !seen.insert(&entry.alias) {
                return Err(ConfigError::Invalid(format!(
                    "tablets.{}: duplicate alias",
                    entry.alias
                )));
            }
        }
        Ok(())
    }

    /// The deadline for calls that do not carry their own, if any.
    pub fn default_timeout(&self) -> Option<Duration> {
        match self.default_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Resolve a configured tablet to a dialable endpoint.
    pub fn endpoint(&self, alias: &TabletAlias) -> Option<RemoteEndpoint> {
        self.tablets
            .iter()
            .find(|t| &t.alias == alias)
            .map(|t| RemoteEndpoint::new(t.alias.clone(), t.addr.clone()))
    }
}

/// Load a `ClientConfig` from a YAML file path.
pub fn load_from_file(path: &std::path::Path) -> Result<ClientConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Load a `ClientConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
