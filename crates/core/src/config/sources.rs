use std::env;
use std::fmt;

/// Origin of a configuration value, reported by `EnvConfig::config_sources`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Set through the named environment variable
    EnvVar(String),
    /// Built-in default, rendered as text
    Default(String),
    /// Read from the configuration file at this path
    File(String),
    /// Set in code
    Programmatic,
}

impl ConfigSource {
    /// `EnvVar(var)` when `var` holds a non-blank value, `Default(default)` otherwise
    pub fn env_or_default(var: &str, default: impl Into<String>) -> Self {
        match env::var(var) {
            Ok(value) if !value.trim().is_empty() => ConfigSource::EnvVar(var.to_string()),
            _ => ConfigSource::Default(default.into()),
        }
    }

    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ConfigSource::File(_))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "env ${}", var),
            ConfigSource::Default(value) => write!(f, "default ({})", value),
            ConfigSource::File(path) => write!(f, "file {}", path),
            ConfigSource::Programmatic => f.write_str("code"),
        }
    }
}
