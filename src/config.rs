//! Configuration for a directory layer and its transaction runner.
//!
//! Values come from a TOML file or defaults, and environment variables
//! override both:
//!
//! ```toml
//! [directory]
//! node_prefix = "fe"
//! content_prefix = ""
//! allow_manual_prefixes = false
//!
//! [retry]
//! max_attempts = 100
//! initial_backoff_ms = 1
//! max_backoff_ms = 128
//! ```

use std::path::Path;
use std::path::PathBuf;

use keystone_directory::DirectoryLayer;
use keystone_directory::DirectoryLayerOptions;
use keystone_kv::RetryPolicy;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;

/// Environment variable overriding `directory.node_prefix` (hex).
pub const ENV_NODE_PREFIX: &str = "KEYSTONE_NODE_PREFIX";
/// Environment variable overriding `directory.content_prefix` (hex).
pub const ENV_CONTENT_PREFIX: &str = "KEYSTONE_CONTENT_PREFIX";
/// Environment variable overriding `directory.allow_manual_prefixes`.
pub const ENV_ALLOW_MANUAL_PREFIXES: &str = "KEYSTONE_ALLOW_MANUAL_PREFIXES";
/// Environment variable overriding `retry.max_attempts`.
pub const ENV_MAX_RETRY_ATTEMPTS: &str = "KEYSTONE_MAX_RETRY_ATTEMPTS";

/// Configuration errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue {
        /// The configuration key or environment variable.
        key: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[snafu(display("failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for this schema.
    #[snafu(display("failed to parse configuration: {source}"))]
    Parse {
        /// The TOML error.
        source: toml::de::Error,
    },

    /// The configuration could not be serialized.
    #[snafu(display("failed to serialize configuration: {source}"))]
    Serialize {
        /// The TOML error.
        source: toml::ser::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoneConfig {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Placement of the directory layer's metadata and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Hex-encoded prefix of the metadata subspace.
    pub node_prefix: String,
    /// Hex-encoded prefix under which content prefixes are allocated.
    pub content_prefix: String,
    /// Accept caller-chosen prefixes when creating directories.
    pub allow_manual_prefixes: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            node_prefix: Self::default_node_prefix(),
            content_prefix: String::new(),
            allow_manual_prefixes: false,
        }
    }
}

impl DirectoryConfig {
    fn default_node_prefix() -> String {
        hex::encode([keystone_directory::constants::DEFAULT_NODE_PREFIX])
    }

    /// Decoded metadata prefix.
    pub fn node_prefix_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        decode_prefix("directory.node_prefix", &self.node_prefix)
    }

    /// Decoded content prefix.
    pub fn content_prefix_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        decode_prefix("directory.content_prefix", &self.content_prefix)
    }

    /// Apply environment variable overrides to existing configuration
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var(ENV_NODE_PREFIX) {
            decode_prefix(ENV_NODE_PREFIX, &val)?;
            self.node_prefix = val;
        }
        if let Ok(val) = std::env::var(ENV_CONTENT_PREFIX) {
            decode_prefix(ENV_CONTENT_PREFIX, &val)?;
            self.content_prefix = val;
        }
        if let Ok(val) = std::env::var(ENV_ALLOW_MANUAL_PREFIXES) {
            self.allow_manual_prefixes = parse_bool(ENV_ALLOW_MANUAL_PREFIXES, &val)?;
        }
        Ok(())
    }

    /// Check that both prefixes decode and that the metadata cannot collide
    /// with an allocated prefix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let node = self.node_prefix_bytes()?;
        let content = self.content_prefix_bytes()?;
        if node.is_empty() {
            return InvalidValueSnafu {
                key: "directory.node_prefix",
                value: self.node_prefix.clone(),
                reason: "must not be empty",
            }
            .fail();
        }
        if node.starts_with(&content) {
            // Allocated prefixes are tuple-encoded integers and never start
            // with 0xFE.
            if node.get(content.len()) != Some(&keystone_directory::constants::DEFAULT_NODE_PREFIX) {
                return InvalidValueSnafu {
                    key: "directory.node_prefix",
                    value: self.node_prefix.clone(),
                    reason: "overlaps the content prefix",
                }
                .fail();
            }
        }
        Ok(())
    }
}

impl KeystoneConfig {
    /// Defaults overridden by environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text. Missing sections take defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).context(ParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        tracing::debug!(path = %path.display(), "loading configuration file");
        Self::from_toml_str(&contents)
    }

    /// Load a file if one is given and exists, then apply environment
    /// overrides on top.
    pub fn load_with_layers(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml_file(path)?,
            Some(path) => {
                tracing::warn!(path = %path.display(), "configuration file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).context(SerializeSnafu)
    }

    /// Apply environment variable overrides to existing configuration
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.directory.apply_env_overrides()?;
        if let Ok(val) = std::env::var(ENV_MAX_RETRY_ATTEMPTS) {
            self.retry.max_attempts = val.parse().map_err(|e| ConfigError::InvalidValue {
                key: ENV_MAX_RETRY_ATTEMPTS.to_string(),
                value: val.clone(),
                reason: format!("{e}"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.directory.validate()?;
        if self.retry.max_attempts == 0 {
            return InvalidValueSnafu {
                key: "retry.max_attempts",
                value: "0",
                reason: "at least one attempt is required",
            }
            .fail();
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return InvalidValueSnafu {
                key: "retry.initial_backoff_ms",
                value: self.retry.initial_backoff_ms.to_string(),
                reason: format!("exceeds retry.max_backoff_ms ({})", self.retry.max_backoff_ms),
            }
            .fail();
        }
        Ok(())
    }

    /// Build the directory layer this configuration describes.
    pub fn directory_layer(&self) -> Result<DirectoryLayer, ConfigError> {
        self.validate()?;
        Ok(DirectoryLayer::new(DirectoryLayerOptions {
            node_prefix: Some(self.directory.node_prefix_bytes()?),
            content_prefix: Some(self.directory.content_prefix_bytes()?),
            allow_manual_prefixes: self.directory.allow_manual_prefixes,
            ..Default::default()
        }))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

fn decode_prefix(key: &str, value: &str) -> Result<Vec<u8>, ConfigError> {
    hex::decode(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: format!("not a hex string: {e}"),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => InvalidValueSnafu {
            key,
            value,
            reason: "expected a boolean",
        }
        .fail(),
    }
}
