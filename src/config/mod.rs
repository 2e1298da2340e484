//! Configuration for a reconciliation run.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (pa_sync.toml)
//! ```toml
//! parallel = true
//!
//! [numeric]
//! precision = 2
//! relative_threshold = 0.01
//!
//! [sources]
//! primary = "protected-planet"
//! secondary = "mpatlas"
//!
//! [keys]
//! key_fields = ["environment", "wdpaid", "wdpa_p_id", "zone_id", "location"]
//! group_fields = ["wdpaid", "environment", "location"]
//! ```

mod defaults;

pub use defaults::*;

use crate::diff::NumericTolerance;
use crate::hierarchy::SourcePrecedence;
use crate::identity::{KeyBuilder, KeyField};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration for a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Rounding and tolerance for area/coverage
    pub numeric: NumericTolerance,
    /// Source precedence for parent election
    pub sources: SourcePrecedence,
    /// Identity and grouping keys
    pub keys: KeyConfig,
    /// Run per-group and per-record stages on the rayon pool
    pub parallel: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            numeric: NumericTolerance::default(),
            sources: SourcePrecedence::default(),
            keys: KeyConfig::default(),
            parallel: DEFAULT_PARALLEL,
        }
    }
}

impl SyncConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(SyncConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        figment = figment.merge(Serialized::defaults(overrides));

        let config: SyncConfig = figment.extract().map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    pub fn key_builder(&self) -> KeyBuilder {
        KeyBuilder::new(self.keys.key_fields.clone())
    }

    pub fn group_builder(&self) -> KeyBuilder {
        KeyBuilder::new(self.keys.group_fields.clone())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.keys.key_fields.is_empty() {
            return Err(ConfigError::new("keys.key_fields must not be empty"));
        }
        if self.keys.group_fields.is_empty() {
            return Err(ConfigError::new("keys.group_fields must not be empty"));
        }
        if self.sources.primary == self.sources.secondary {
            return Err(ConfigError::new(
                "sources.primary and sources.secondary must differ",
            ));
        }
        let threshold = self.numeric.relative_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return Err(ConfigError::new(
                "numeric.relative_threshold must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Identity and grouping key layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Fields aligning candidates with the snapshot, in order
    pub key_fields: Vec<KeyField>,
    /// Fields defining a hierarchy group, in order
    pub group_fields: Vec<KeyField>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            key_fields: KeyField::default_key(),
            group_fields: KeyField::default_group(),
        }
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_threshold: Option<f64>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
