//! Database Backend Abstractions
//!
//! PostgreSQL and SQLite implementations of the connection traits the
//! transaction manager is written against.

pub mod core;
pub mod postgres;
pub mod sqlite;

pub use self::core::*;
pub use postgres::PostgresSource;
pub use sqlite::SqliteSource;

use crate::error::{TxError, TxResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    PostgreSQL,
    SQLite,
}

impl BackendKind {
    /// Detect the backend from a connection URL scheme
    pub fn from_url(url: &str) -> TxResult<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| TxError::Connection(format!("Database URL has no scheme: {}", url)))?;
        scheme.parse()
    }

    /// Positional placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            BackendKind::PostgreSQL => format!("${}", index),
            BackendKind::SQLite => "?".to_string(),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::PostgreSQL => write!(f, "postgresql"),
            BackendKind::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(BackendKind::PostgreSQL),
            "sqlite" => Ok(BackendKind::SQLite),
            _ => Err(TxError::Connection(format!("Unsupported database backend: {}", s))),
        }
    }
}
