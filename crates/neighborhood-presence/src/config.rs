//! Configuration loading and typed config structures for the presence server.
//!
//! The canonical configuration lives in `neighborhood-config.yaml` in the
//! working directory. This module defines strongly-typed structs that mirror
//! the YAML structure and a loader that reads and validates the file. Every
//! field has a default, so an empty (or missing) file is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The parsed values are out of range.
    #[error("invalid config: {source}")]
    Invalid {
        /// The failed validation rules.
        #[from]
        source: validator::ValidationErrors,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct NeighborhoodConfig {
    /// HTTP listener settings.
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,

    /// Registry and channel behaviour.
    #[serde(default)]
    #[validate(nested)]
    pub presence: PresenceConfig,

    /// Identity service used for profile enrichment.
    #[serde(default)]
    #[validate(nested)]
    pub identity: IdentityConfig,
}

impl NeighborhoodConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `NEIGHBORHOOD_HOST` overrides `server.host`
    /// - `NEIGHBORHOOD_PORT` overrides `server.port`
    /// - `IDENTITY_URL` overrides `identity.base_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply env overrides and
    /// validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.server.apply_env_overrides();
        config.identity.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Apply `NEIGHBORHOOD_HOST` / `NEIGHBORHOOD_PORT` overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NEIGHBORHOOD_HOST") {
            self.host = val;
        }
        if let Ok(val) = std::env::var("NEIGHBORHOOD_PORT") {
            match val.parse() {
                Ok(port) => self.port = port,
                Err(e) => tracing::warn!(value = %val, error = %e, "ignoring invalid NEIGHBORHOOD_PORT"),
            }
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Registry and sync channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct PresenceConfig {
    /// Seconds without any inbound frame before a channel is force-closed.
    #[serde(default = "default_liveness_timeout_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub liveness_timeout_secs: u64,

    /// Capacity of the registry change-event channel. Subscribers that
    /// fall further behind are resynced with a snapshot.
    #[serde(default = "default_broadcast_capacity")]
    #[validate(range(min = 16, max = 65536))]
    pub broadcast_capacity: usize,

    /// Display name shown until enrichment completes.
    #[serde(default = "default_display_name")]
    #[validate(length(min = 1, max = 64))]
    pub default_display_name: String,
}

impl PresenceConfig {
    /// The liveness timeout as a [`Duration`].
    pub const fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            liveness_timeout_secs: default_liveness_timeout_secs(),
            broadcast_capacity: default_broadcast_capacity(),
            default_display_name: default_display_name(),
        }
    }
}

/// Identity service settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct IdentityConfig {
    /// Base URL of the identity service. Enrichment is disabled when unset.
    #[serde(default)]
    #[validate(url)]
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_identity_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

impl IdentityConfig {
    /// Apply the `IDENTITY_URL` override.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("IDENTITY_URL") {
            self.base_url = Some(val);
        }
    }

    /// The request timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_identity_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

const fn default_liveness_timeout_secs() -> u64 {
    30
}

const fn default_broadcast_capacity() -> usize {
    1024
}

fn default_display_name() -> String {
    String::from(neighborhood_types::DEFAULT_DISPLAY_NAME)
}

const fn default_identity_timeout_ms() -> u64 {
    5000
}
