//! Transaction template properties
//!
//! Loaded from YAML or from `TX_TEMPLATE_*` environment variables:
//!
//! ```yaml
//! enabled: true
//! default:
//!   propagation: REQUIRED
//!   isolation: READ_COMMITTED
//!   read_only: false
//!   timeout_seconds: 30
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use txtemplate_core::config::{parse_env, parse_env_bool};
use txtemplate_core::{ConfigError, ConfigSource, EnvConfig};

use crate::definition::{DefaultTransactionSettings, Isolation, Propagation, TransactionSettings};

const ENABLED_VAR: &str = "TX_TEMPLATE_ENABLED";
const PROPAGATION_VAR: &str = "TX_TEMPLATE_DEFAULT_PROPAGATION";
const ISOLATION_VAR: &str = "TX_TEMPLATE_DEFAULT_ISOLATION";
const READ_ONLY_VAR: &str = "TX_TEMPLATE_DEFAULT_READ_ONLY";
const TIMEOUT_VAR: &str = "TX_TEMPLATE_DEFAULT_TIMEOUT_SECONDS";

/// Whether templates are provided and which settings they default to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionTemplateProperties {
    pub enabled: bool,
    pub default: DefaultProperties,
}

impl Default for TransactionTemplateProperties {
    fn default() -> Self {
        Self {
            enabled: true,
            default: DefaultProperties::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultProperties {
    pub propagation: Propagation,
    pub isolation: Isolation,
    pub read_only: bool,
    /// Unset means no timeout
    pub timeout_seconds: Option<u64>,
}

impl Default for DefaultProperties {
    fn default() -> Self {
        Self {
            propagation: DefaultTransactionSettings::PROPAGATION,
            isolation: DefaultTransactionSettings::ISOLATION,
            read_only: DefaultTransactionSettings::READ_ONLY,
            timeout_seconds: DefaultTransactionSettings::TIMEOUT.map(|timeout| timeout.as_secs()),
        }
    }
}

impl TransactionTemplateProperties {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let properties: Self = serde_yaml::from_str(yaml)?;
        properties.validate()?;
        Ok(properties)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Settings templates use when a call does not pass its own
    pub fn to_settings(&self) -> TransactionSettings {
        TransactionSettings::new(
            self.default.read_only,
            self.default.propagation,
            self.default.isolation,
            self.default.timeout_seconds.map(Duration::from_secs),
        )
    }
}

impl EnvConfig for TransactionTemplateProperties {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let properties = Self {
            enabled: parse_env_bool(ENABLED_VAR, "enabled")?.unwrap_or(defaults.enabled),
            default: DefaultProperties {
                propagation: parse_env(
                    PROPAGATION_VAR,
                    "default.propagation",
                    "one of REQUIRED, SUPPORTS, MANDATORY, REQUIRES_NEW, NOT_SUPPORTED, NEVER, NESTED",
                )?
                .unwrap_or(defaults.default.propagation),
                isolation: parse_env(
                    ISOLATION_VAR,
                    "default.isolation",
                    "one of DEFAULT, READ_UNCOMMITTED, READ_COMMITTED, REPEATABLE_READ, SERIALIZABLE",
                )?
                .unwrap_or(defaults.default.isolation),
                read_only: parse_env_bool(READ_ONLY_VAR, "default.read_only")?
                    .unwrap_or(defaults.default.read_only),
                timeout_seconds: parse_env(TIMEOUT_VAR, "default.timeout_seconds", "positive integer")?
                    .or(defaults.default.timeout_seconds),
            },
        };

        properties.validate()?;
        Ok(properties)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default.timeout_seconds == Some(0) {
            return Err(ConfigError::validation_failed(
                "default.timeout_seconds must be greater than zero; leave it unset for no timeout",
            ));
        }
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let defaults = DefaultProperties::default();
        let timeout_default = match defaults.timeout_seconds {
            Some(seconds) => seconds.to_string(),
            None => "none".to_string(),
        };

        HashMap::from([
            ("enabled".to_string(), ConfigSource::env_or_default(ENABLED_VAR, "true")),
            (
                "default.propagation".to_string(),
                ConfigSource::env_or_default(PROPAGATION_VAR, defaults.propagation.as_str()),
            ),
            (
                "default.isolation".to_string(),
                ConfigSource::env_or_default(ISOLATION_VAR, defaults.isolation.as_str()),
            ),
            (
                "default.read_only".to_string(),
                ConfigSource::env_or_default(READ_ONLY_VAR, defaults.read_only.to_string()),
            ),
            (
                "default.timeout_seconds".to_string(),
                ConfigSource::env_or_default(TIMEOUT_VAR, timeout_default),
            ),
        ])
    }
}
