use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T: ?Sized> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Database URL validator
pub struct DatabaseUrlValidator {
    pub schemes: Vec<String>,
}

impl Default for DatabaseUrlValidator {
    fn default() -> Self {
        Self {
            schemes: vec![
                "postgres".to_string(),
                "postgresql".to_string(),
                "sqlite".to_string(),
            ],
        }
    }
}

impl ConfigValidator<str> for DatabaseUrlValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() {
            return Err(ConfigError::invalid_value(
                "database_url",
                value,
                "non-empty URL",
            ));
        }

        // sqlite URLs may omit the authority ("sqlite::memory:", "sqlite:data.db")
        let has_valid_scheme = self
            .schemes
            .iter()
            .any(|scheme| value.starts_with(&format!("{}:", scheme)));

        if !has_valid_scheme {
            return Err(ConfigError::invalid_value(
                "database_url",
                value,
                format!("URL with scheme: {}", self.schemes.join(", ")),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_validator() {
        let validator = DatabaseUrlValidator::default();
        assert!(validator.validate("postgres://localhost/app").is_ok());
        assert!(validator.validate("postgresql://user@db:5432/app").is_ok());
        assert!(validator.validate("sqlite::memory:").is_ok());
        assert!(validator.validate("sqlite:///tmp/app.db").is_ok());

        assert!(validator.validate("").is_err());
        assert!(matches!(
            validator.validate("mysql://localhost/app"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::invalid_value("propagation", "SOMETIMES", "REQUIRED, SUPPORTS, ...");
        assert_eq!(
            err.to_string(),
            "Invalid value for field 'propagation': 'SOMETIMES'. Expected: REQUIRED, SUPPORTS, ..."
        );

        let err = ConfigError::validation_failed("default.timeout_seconds must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Configuration validation failed: default.timeout_seconds must be greater than zero"
        );
    }
}
