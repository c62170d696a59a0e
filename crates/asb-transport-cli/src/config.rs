//! CLI configuration loading.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults (every field carries a serde default)
//! 2. The TOML file given by `--config` / `ASB_TRANSPORT_CONFIG`
//! 3. Environment variables prefixed `ASB_TRANSPORT__`, e.g.
//!    `ASB_TRANSPORT__MANAGEMENT__REQUEST_TIMEOUT_SECONDS=60`

use asb_transport_core::providers::{ClientSettings, DEFAULT_API_VERSION};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

const ENV_PREFIX: &str = "ASB_TRANSPORT";
const ENV_SEPARATOR: &str = "__";
const MAX_TOKEN_LIFETIME_MINUTES: i64 = 60 * 24 * 365;

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

/// CLI configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    pub logging: LoggingConfig,
    pub management: ManagementConfig,
}

impl CliConfig {
    /// Layer defaults, the optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let loaded: CliConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.level.trim().is_empty() {
            return Err(invalid("logging.level", "must not be empty"));
        }
        if self.management.request_timeout_seconds == 0 {
            return Err(invalid(
                "management.request_timeout_seconds",
                "must be greater than zero",
            ));
        }
        if !(1..=MAX_TOKEN_LIFETIME_MINUTES).contains(&self.management.token_lifetime_minutes) {
            return Err(invalid(
                "management.token_lifetime_minutes",
                &format!("must be between 1 and {}", MAX_TOKEN_LIFETIME_MINUTES),
            ));
        }
        if self.management.api_version.trim().is_empty() {
            return Err(invalid("management.api_version", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when neither `--log-level` nor `RUST_LOG` is set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum LogFormat {
    #[default]
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "json")]
    Json,
}

/// Settings for the management REST client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagementConfig {
    pub request_timeout_seconds: u64,
    pub token_lifetime_minutes: i64,
    pub api_version: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            token_lifetime_minutes: 60,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl ManagementConfig {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            token_lifetime: chrono::Duration::minutes(self.token_lifetime_minutes),
            api_version: self.api_version.clone(),
        }
    }
}
