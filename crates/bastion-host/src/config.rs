//! Host configuration loaded from `bastion.yaml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Environment variables override the YAML for deployment-specific values:
//!
//! - `BASTION_DRAGONFLY_URL` overrides `store.dragonfly_url`
//! - `BASTION_STORE_BACKEND` overrides `store.backend`

use std::path::Path;

use bastion_types::{KeyError, Namespace};
use serde::Deserialize;

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

    /// `store.namespace` violates the key grammar.
    #[error("invalid store namespace: {source}")]
    Namespace {
        /// The underlying key error.
        #[from]
        source: KeyError,
    },

    /// An environment override named an unknown backend.
    #[error("unknown store backend {value:?} (expected memory or dragonfly)")]
    UnknownBackend {
        /// The rejected value.
        value: String,
    },

    /// `economy.max_balance` was not positive.
    #[error("economy.max_balance must be positive, got {value}")]
    MaxBalance {
        /// The rejected value.
        value: f64,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level host configuration.
///
/// Mirrors the structure of `bastion.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HostConfig {
    /// Property store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Balance rules.
    #[serde(default)]
    pub economy: EconomyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or any
    /// error from [`apply_overrides`](Self::apply_overrides).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// See [`from_file`](Self::from_file).
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBackend`] if `BASTION_STORE_BACKEND`
    /// names no known backend.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("BASTION_DRAGONFLY_URL") {
            self.store.dragonfly_url = url;
        }
        if let Some(value) = lookup("BASTION_STORE_BACKEND") {
            self.store.backend = value.parse()?;
        }
        Ok(())
    }

    /// The validated namespace every property key is created in.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Namespace`] if `store.namespace` is invalid.
    pub fn namespace(&self) -> Result<Namespace, ConfigError> {
        Ok(Namespace::new(&self.store.namespace)?)
    }

    /// Check values the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.namespace()?;
        let max = self.economy.max_balance;
        if max.is_nan() || max <= 0.0 {
            return Err(ConfigError::MaxBalance { value: max });
        }
        Ok(())
    }
}

/// Where property values are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local; lost on exit.
    #[default]
    Memory,
    /// A Dragonfly (or any Redis-compatible) server.
    Dragonfly,
}

impl core::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "dragonfly" => Ok(Self::Dragonfly),
            _ => Err(ConfigError::UnknownBackend {
                value: s.to_owned(),
            }),
        }
    }
}

impl core::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Dragonfly => f.write_str("dragonfly"),
        }
    }
}

/// Property store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Owner scope of every property key.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Backend holding the values.
    #[serde(default)]
    pub backend: BackendKind,

    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            backend: BackendKind::default(),
            dragonfly_url: default_dragonfly_url(),
        }
    }
}

/// Balance rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EconomyConfig {
    /// Ceiling every credit is clamped to.
    #[serde(default = "default_max_balance")]
    pub max_balance: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            max_balance: default_max_balance(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_namespace() -> String {
    "bastion".to_owned()
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

const fn default_max_balance() -> f64 {
    f64::MAX
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_is_valid() {
        let config = HostConfig::default();
        assert_eq!(config.store.namespace, "bastion");
        assert_eq!(config.store.backend, BackendKind::Memory);
        assert_eq!(config.store.dragonfly_url, "redis://localhost:6379");
        assert_eq!(config.economy.max_balance, f64::MAX);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
store:
  namespace: "towny"
  backend: dragonfly
  dragonfly_url: "redis://cache:6379"

economy:
  max_balance: 1000000.0

logging:
  level: "debug"
  json: true
"#;
        let mut config: HostConfig = serde_yml::from_str(yaml).unwrap();
        config.apply_overrides(no_env).unwrap();
        assert_eq!(config.store.namespace, "towny");
        assert_eq!(config.store.backend, BackendKind::Dragonfly);
        assert_eq!(config.store.dragonfly_url, "redis://cache:6379");
        assert_eq!(config.economy.max_balance, 1_000_000.0);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: HostConfig = serde_yml::from_str("economy:\n  max_balance: 50.0\n").unwrap();
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.economy.max_balance, 50.0);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("BASTION_DRAGONFLY_URL", "redis://elsewhere:6380"),
            ("BASTION_STORE_BACKEND", "Dragonfly"),
        ]
        .into_iter()
        .collect();
        let mut config = HostConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| (*v).to_owned()))
            .unwrap();
        assert_eq!(config.store.dragonfly_url, "redis://elsewhere:6380");
        assert_eq!(config.store.backend, BackendKind::Dragonfly);
    }

    #[test]
    fn unknown_backend_override_is_rejected() {
        let mut config = HostConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "BASTION_STORE_BACKEND").then(|| "postgres".to_owned())
        });
        assert!(matches!(result, Err(ConfigError::UnknownBackend { .. })));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = HostConfig::default();
        config.store.namespace = "My Plugin".to_owned();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Namespace { .. })
        ));

        let mut config = HostConfig::default();
        config.economy.max_balance = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MaxBalance { .. })
        ));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            HostConfig::parse("store: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
