mod connectivity;
mod local_model;
mod observability;
mod remote;
mod store;

pub use connectivity::*;
pub use local_model::*;
pub use observability::*;
pub use remote::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local_model: LocalModelConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for missing keys.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Load from file if it exists, otherwise return defaults. Environment
    /// overrides are applied in both cases.
    pub fn load_or_default(path: &Path) -> Self {
        let mut config = match Self::load(path) {
            Ok(c) => c,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// `HT_REMOTE_URL` and `HT_STATE_PATH` override the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("HT_REMOTE_URL") {
            if !url.is_empty() {
                self.remote.base_url = url;
            }
        }
        if let Ok(path) = std::env::var("HT_STATE_PATH") {
            if !path.is_empty() {
                self.store.state_path = PathBuf::from(path);
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.remote.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "remote.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        } else if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "remote.base_url".into(),
                message: "base_url must be an http(s) URL".into(),
            });
        }

        if self.remote.timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "remote.timeout_secs".into(),
                message: "timeout must be greater than 0".into(),
            });
        }

        if self.store.history_limit == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "store.history_limit".into(),
                message: "history reads will always be empty".into(),
            });
        }

        if self.local_model.weights_filename.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "local_model.weights_filename".into(),
                message: "weights_filename must not be empty".into(),
            });
        }

        if self.local_model.weights_url.is_none() && !self.local_model.weights_path().exists() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "local_model.weights_url".into(),
                message: "no weights URL and no cached weights; offline mode will fail to load"
                    .into(),
            });
        }

        if let Some(ref sha) = self.local_model.sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "local_model.sha256".into(),
                    message: "sha256 must be 64 hex characters".into(),
                });
            }
        }

        if !(0.0..=2.0).contains(&self.local_model.temperature) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "local_model.temperature".into(),
                message: "temperature outside 0.0–2.0".into(),
            });
        }

        errors
    }
}
