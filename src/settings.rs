// settings.rs - Layered Configuration

//! Configuration for registry and node processes.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional file (TOML, YAML or JSON, picked by extension)
//! 3. environment variables prefixed `TRUSTSHARE__`, with `__` separating
//!    nested keys (e.g. `TRUSTSHARE__NODE__REGISTRY=10.0.0.1:5000`)
//!
//! Command-line flags are applied on top by the binaries.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use crate::network::NetworkConfig;

const ENV_PREFIX: &str = "TRUSTSHARE";

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Registry process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry name, placed in its certificate
    pub name: String,

    /// Listen address
    pub listen: SocketAddr,

    pub network: NetworkConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "registry".to_string(),
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            network: NetworkConfig::default(),
        }
    }
}

/// Communicator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicatorConfig {
    /// Node name, placed in its certificate
    pub name: String,

    /// Listen address for peer requests
    pub listen: SocketAddr,

    /// Address advertised in the certificate; defaults to the bound address
    pub advertise: Option<SocketAddr>,

    /// Registry address
    pub registry: SocketAddr,

    /// Refuse fetched content whose reply signature does not verify
    pub strict_reply_verification: bool,

    pub network: NetworkConfig,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            name: "node".to_string(),
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            advertise: None,
            registry: SocketAddr::from(([127, 0, 0, 1], 5000)),
            strict_reply_verification: true,
            network: NetworkConfig::default(),
        }
    }
}

/// Logging and metrics settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log format (pretty, compact, json)
    pub log_format: String,

    /// Prometheus endpoint; metrics are disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_addr: None,
        }
    }
}

/// Complete settings tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub registry: RegistryConfig,
    pub node: CommunicatorConfig,
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Load defaults, then `path` (if any), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (what, network) in [("registry", &self.registry.network), ("node", &self.node.network)] {
            if network.connect_timeout_ms == 0 || network.io_timeout_ms == 0 {
                return Err(SettingsError::Invalid(format!(
                    "{what}: timeouts must be greater than zero"
                )));
            }
            if network.max_frame_bytes < 1024 {
                return Err(SettingsError::Invalid(format!(
                    "{what}: max_frame_bytes must be at least 1024"
                )));
            }
        }

        if self.node.name.trim().is_empty() || self.registry.name.trim().is_empty() {
            return Err(SettingsError::Invalid("names must not be empty".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.node.strict_reply_verification);
        assert_eq!(settings.registry.listen.port(), 5000);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[registry]
name = "root-ca"
listen = "127.0.0.1:6100"

[node]
name = "alice"
registry = "127.0.0.1:6100"
strict_reply_verification = false

[node.network]
io_timeout_ms = 2500
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.registry.name, "root-ca");
        assert_eq!(settings.registry.listen.port(), 6100);
        assert_eq!(settings.node.name, "alice");
        assert!(!settings.node.strict_reply_verification);
        assert_eq!(settings.node.network.io_timeout_ms, 2500);
        assert_eq!(settings.node.network.connect_timeout_ms, 5000);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut settings = Settings::default();
        settings.node.network.io_timeout_ms = 0;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }
}
