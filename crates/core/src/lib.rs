//! # txtemplate-core
//!
//! Shared foundation for the txtemplate crates: configuration errors,
//! configuration source tracking, environment-driven configuration and
//! structured logging setup.

pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigSource, ConfigValidator, DatabaseUrlValidator, EnvConfig};
pub use logging::{init_logging, LoggingConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
