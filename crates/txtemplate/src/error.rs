//! Error types for transaction templates and the SQL client

use std::time::Duration;
use thiserror::Error;
use txtemplate_core::ConfigError;

use crate::definition::Isolation;

/// Result type alias for transaction operations
pub type TxResult<T> = Result<T, TxError>;

/// Error types for transaction demarcation and statement execution
#[derive(Debug, Error)]
pub enum TxError {
    /// Connection could not be acquired or the pool is unusable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement or transaction-control command rejected by the database
    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQLSTATE (PostgreSQL) or result code (SQLite), when reported
        code: Option<String>,
    },

    /// Propagation rules forbid running in the current transaction state
    #[error("Illegal transaction state: {0}")]
    IllegalTransactionState(String),

    /// Commit requested but a participant marked the transaction rollback-only
    #[error("Transaction rolled back: {0}")]
    UnexpectedRollback(String),

    /// Unit of work did not complete before the transaction deadline
    #[error("Transaction timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Query returned a different number of rows than required
    #[error("Incorrect result size: expected {expected}, actual {actual}")]
    IncorrectResultSize { expected: usize, actual: usize },

    /// Scalar query returned a different number of columns than one
    #[error("Incorrect column count: expected {expected}, actual {actual}")]
    IncorrectColumnCount { expected: usize, actual: usize },

    /// Named placeholder without a bound value
    #[error("No value supplied for the SQL parameter ':{0}'")]
    MissingParameter(String),

    /// Column value could not be converted into the requested type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Isolation level the backend cannot provide
    #[error("Isolation level {isolation} is not supported by {backend}")]
    UnsupportedIsolation { isolation: Isolation, backend: String },

    /// Invalid transaction template configuration
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

impl TxError {
    /// Create a database error without a reported code
    pub fn database(message: impl Into<String>) -> Self {
        TxError::Database {
            message: message.into(),
            code: None,
        }
    }

    /// SQLSTATE or engine result code of a database error
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            TxError::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Check whether the database refused a write inside a read-only transaction
    pub fn is_read_only_violation(&self) -> bool {
        match self {
            TxError::Database { message, code } => {
                // 25006 = read_only_sql_transaction, 8 = SQLITE_READONLY
                matches!(code.as_deref(), Some("25006") | Some("8"))
                    || message.contains("read-only transaction")
                    || message.contains("readonly database")
            }
            _ => false,
        }
    }

    /// Check if this error represents a serialization failure that can be retried
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            TxError::Database { message, code } => {
                matches!(code.as_deref(), Some("40001") | Some("40P01"))
                    || message.contains("could not serialize access")
                    || message.contains("deadlock detected")
            }
            _ => false,
        }
    }
}

impl From<sqlx::Error> for TxError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => TxError::Database {
                code: db_err.code().map(|code| code.into_owned()),
                message: db_err.message().to_string(),
            },
            sqlx::Error::PoolTimedOut => {
                TxError::Connection("Timed out acquiring a connection from the pool".to_string())
            }
            sqlx::Error::PoolClosed => TxError::Connection("Pool is closed".to_string()),
            sqlx::Error::Io(io_err) => TxError::Connection(io_err.to_string()),
            sqlx::Error::ColumnDecode { index, source } => {
                TxError::Decode(format!("column {}: {}", index, source))
            }
            other => TxError::database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for TxError {
    fn from(err: serde_json::Error) -> Self {
        TxError::Decode(err.to_string())
    }
}
