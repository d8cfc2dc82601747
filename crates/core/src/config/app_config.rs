use crate::config::{ConfigError, ConfigSource};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Configuration that can be assembled from environment variables
pub trait EnvConfig: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Read an environment variable and parse it, `Ok(None)` when unset.
///
/// Empty values are treated as unset.
pub fn parse_env<T>(var: &str, field: &str, expected: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
{
    match env::var(var) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(field, raw, expected)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::invalid_value(
            field,
            format!("<non-unicode value of {}>", var),
            expected,
        )),
    }
}

/// Read a boolean environment variable (`true/false`, `1/0`, `yes/no`, `on/off`)
pub fn parse_env_bool(var: &str, field: &str) -> Result<Option<bool>, ConfigError> {
    let raw: Option<String> = parse_env(var, field, "boolean")?;
    match raw {
        None => Ok(None),
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::invalid_value(field, raw, "boolean")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_env_unset_and_empty() {
        env::remove_var("TXTEMPLATE_CORE_TEST_NUMBER");
        let value: Option<u64> = parse_env("TXTEMPLATE_CORE_TEST_NUMBER", "number", "integer").unwrap();
        assert_eq!(value, None);

        env::set_var("TXTEMPLATE_CORE_TEST_NUMBER", "  ");
        let value: Option<u64> = parse_env("TXTEMPLATE_CORE_TEST_NUMBER", "number", "integer").unwrap();
        assert_eq!(value, None);

        env::remove_var("TXTEMPLATE_CORE_TEST_NUMBER");
    }

    #[test]
    #[serial]
    fn test_parse_env_value_and_error() {
        env::set_var("TXTEMPLATE_CORE_TEST_NUMBER", "42");
        let value: Option<u64> = parse_env("TXTEMPLATE_CORE_TEST_NUMBER", "number", "integer").unwrap();
        assert_eq!(value, Some(42));

        env::set_var("TXTEMPLATE_CORE_TEST_NUMBER", "forty-two");
        let result: Result<Option<u64>, _> =
            parse_env("TXTEMPLATE_CORE_TEST_NUMBER", "number", "integer");
        match result {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "number");
                assert_eq!(value, "forty-two");
            }
            other => panic!("Expected invalid value error, got {:?}", other),
        }

        env::remove_var("TXTEMPLATE_CORE_TEST_NUMBER");
    }

    #[test]
    #[serial]
    fn test_parse_env_bool() {
        for (raw, expected) in [("true", true), ("1", true), ("YES", true), ("off", false), ("0", false)] {
            env::set_var("TXTEMPLATE_CORE_TEST_FLAG", raw);
            assert_eq!(parse_env_bool("TXTEMPLATE_CORE_TEST_FLAG", "flag").unwrap(), Some(expected));
        }

        env::set_var("TXTEMPLATE_CORE_TEST_FLAG", "maybe");
        assert!(parse_env_bool("TXTEMPLATE_CORE_TEST_FLAG", "flag").is_err());

        env::remove_var("TXTEMPLATE_CORE_TEST_FLAG");
    }
}
