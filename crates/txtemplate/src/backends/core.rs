//! Core Database Backend Traits
//!
//! Connection-level abstraction the transaction manager drives. Backends issue
//! transaction-control statements themselves, so a physical transaction is
//! just a pooled connection with an open `BEGIN`.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::BackendKind;
use crate::definition::TransactionSettings;
use crate::error::{TxError, TxResult};

/// Source of pooled connections
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Acquire a connection from the pool
    async fn acquire(&self) -> TxResult<Box<dyn BackendConnection>>;

    /// Backend this source connects to
    fn backend(&self) -> BackendKind;

    /// Close the pool
    async fn close(&self);
}

/// A single pooled connection
#[async_trait]
pub trait BackendConnection: Send {
    /// Execute a statement and return affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> TxResult<u64>;

    /// Execute a query and return the result rows
    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> TxResult<Vec<Row>>;

    /// Begin a transaction with the given isolation level and access mode
    async fn begin(&mut self, settings: &TransactionSettings) -> TxResult<()>;

    /// Commit the open transaction
    async fn commit(&mut self) -> TxResult<()>;

    /// Rollback the open transaction
    async fn rollback(&mut self) -> TxResult<()>;

    async fn create_savepoint(&mut self, name: &str) -> TxResult<()> {
        self.execute(&format!("SAVEPOINT {}", name), &[]).await.map(|_| ())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> TxResult<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", name), &[])
            .await
            .map(|_| ())
    }

    async fn release_savepoint(&mut self, name: &str) -> TxResult<()> {
        self.execute(&format!("RELEASE SAVEPOINT {}", name), &[])
            .await
            .map(|_| ())
    }

    /// Drop the connection without returning it to the pool.
    ///
    /// Used for connections abandoned with a transaction still open.
    fn discard(self: Box<Self>);
}

/// Materialized result row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> TxResult<&DatabaseValue> {
        self.values.get(index).ok_or_else(|| {
            TxError::Decode(format!(
                "Column index {} out of range (row has {} columns)",
                index,
                self.values.len()
            ))
        })
    }

    /// Get a column value by name
    pub fn get_by_name(&self, name: &str) -> TxResult<&DatabaseValue> {
        let index = self
            .columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| TxError::Decode(format!("Column '{}' not found", name)))?;
        self.get_by_index(index)
    }

    /// Get a typed value from a column
    pub fn get<T>(&self, column: &str) -> TxResult<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        self.get_by_name(column)?
            .decode()
            .map_err(|e| TxError::Decode(format!("Failed to deserialize column '{}': {}", column, e)))
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::from(*i),
            DatabaseValue::Int64(i) => JsonValue::from(*i),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(b.iter().map(|&x| JsonValue::from(x)).collect()),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }

    /// Decode into a Rust value through its serde representation
    pub fn decode<T>(&self) -> TxResult<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        serde_json::from_value(self.to_json()).map_err(|e| {
            TxError::Decode(format!("Cannot decode {} value: {}", self.type_name(), e))
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "NULL",
            DatabaseValue::Bool(_) => "BOOL",
            DatabaseValue::Int32(_) => "INT4",
            DatabaseValue::Int64(_) => "INT8",
            DatabaseValue::Float64(_) => "FLOAT8",
            DatabaseValue::String(_) => "TEXT",
            DatabaseValue::Bytes(_) => "BYTES",
            DatabaseValue::Uuid(_) => "UUID",
            DatabaseValue::DateTime(_) => "TIMESTAMPTZ",
            DatabaseValue::Json(_) => "JSON",
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DatabaseValue::Null)
    }
}
