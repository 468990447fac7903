//! Configuration management for quotagate.
//!
//! Settings come from an optional YAML file overlaid with `QUOTAGATE__*`
//! environment variables (e.g. `QUOTAGATE__SHARED__URL`). Every field has a
//! default; with no shared URL the engine runs on the local backend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{QuotaError, Result};
use crate::ratelimit::PolicyOverride;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "QUOTAGATE";

/// Main configuration for quotagate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Shared counter backend connection
    #[serde(default)]
    pub shared: SharedSettings,

    /// Local counter backend tuning
    #[serde(default)]
    pub local: LocalSettings,

    /// What to do when the shared backend fails mid-flight
    #[serde(default)]
    pub failure_mode: FailureMode,

    /// Per-category overrides of the compiled policy table
    #[serde(default)]
    pub policies: HashMap<String, PolicyOverride>,
}

/// Shared (Redis) counter backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedSettings {
    /// Connection URL, e.g. `redis://cache:6379`. Unset means local only.
    #[serde(default)]
    pub url: Option<String>,

    /// Credential, used as the password when the URL has none
    #[serde(default)]
    pub token: Option<String>,

    /// Prefix for every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Bound on each round trip, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl SharedSettings {
    /// Whether a shared backend is configured.
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Round-trip timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            key_prefix: default_key_prefix(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_key_prefix() -> String {
    "quotagate:".to_string()
}

fn default_timeout_ms() -> u64 {
    250
}

/// Local counter backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Minimum seconds between eviction sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl LocalSettings {
    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

/// Behaviour when the shared backend errors or times out during a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Answer from the local backend instead
    #[default]
    Open,
    /// Deny the request
    Closed,
}

impl Settings {
    /// Load settings from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Load settings from a YAML file only.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| QuotaError::Config(format!("Failed to parse settings: {}", e)))
    }
}
