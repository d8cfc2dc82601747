//! SQLite Backend Implementation
//!
//! SQLite has a single isolation level (serializable) and no `READ ONLY`
//! transaction mode, so access mode and dirty reads are switched through
//! per-connection pragmas that are reset when the transaction completes.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Executor, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use super::core::*;
use super::BackendKind;
use crate::database::PoolConfig;
use crate::definition::{Isolation, TransactionSettings};
use crate::error::{TxError, TxResult};

/// SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    /// Create a pool for `database_url`, creating the database file if missing
    pub async fn connect(database_url: &str, config: &PoolConfig) -> TxResult<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| TxError::Connection(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let mut options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        if let Some(max_lifetime) = config.max_lifetime {
            options = options.max_lifetime(Duration::from_secs(max_lifetime));
        }

        let pool = options
            .connect_with(connect_options)
            .await
            .map_err(|e| TxError::Connection(format!("Failed to create SQLite pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing sqlx pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for SqliteSource {
    async fn acquire(&self) -> TxResult<Box<dyn BackendConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| TxError::Connection(format!("Failed to acquire connection: {}", e)))?;

        Ok(Box::new(SqliteConnection {
            conn,
            query_only: false,
            read_uncommitted: false,
        }))
    }

    fn backend(&self) -> BackendKind {
        BackendKind::SQLite
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// SQLite connection implementation
pub struct SqliteConnection {
    conn: PoolConnection<Sqlite>,
    /// `PRAGMA query_only` switched on for the open transaction
    query_only: bool,
    /// `PRAGMA read_uncommitted` switched on for the open transaction
    read_uncommitted: bool,
}

impl SqliteConnection {
    async fn control(&mut self, sql: &str) -> TxResult<()> {
        debug!(target: "txtemplate::sqlite", "{}", sql);
        (&mut *self.conn).execute(sql).await?;
        Ok(())
    }

    /// Run COMMIT/ROLLBACK, then restore the connection's session pragmas
    async fn finish(&mut self, sql: &str) -> TxResult<()> {
        let outcome = self.control(sql).await;
        let reset = self.reset_session().await;
        outcome?;
        reset
    }

    async fn reset_session(&mut self) -> TxResult<()> {
        if self.query_only {
            self.control("PRAGMA query_only = OFF").await?;
            self.query_only = false;
        }
        if self.read_uncommitted {
            self.control("PRAGMA read_uncommitted = OFF").await?;
            self.read_uncommitted = false;
        }
        Ok(())
    }
}

#[async_trait]
impl BackendConnection for SqliteConnection {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> TxResult<u64> {
        let mut query = sqlx::query(sql);

        for param in params {
            query = bind_database_value(query, param);
        }

        let result = query.execute(&mut *self.conn).await?;

        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> TxResult<Vec<Row>> {
        let mut query = sqlx::query(sql);

        for param in params {
            query = bind_database_value(query, param);
        }

        let rows = query.fetch_all(&mut *self.conn).await?;

        rows.iter().map(materialize_row).collect()
    }

    async fn begin(&mut self, settings: &TransactionSettings) -> TxResult<()> {
        match settings.isolation {
            Isolation::Default | Isolation::Serializable => {}
            Isolation::ReadUncommitted => {
                self.control("PRAGMA read_uncommitted = ON").await?;
                self.read_uncommitted = true;
            }
            isolation => {
                return Err(TxError::UnsupportedIsolation {
                    isolation,
                    backend: BackendKind::SQLite.to_string(),
                });
            }
        }

        if let Err(e) = self.control("BEGIN").await {
            if let Err(reset_err) = self.reset_session().await {
                warn!("Failed to reset SQLite session after BEGIN failure: {}", reset_err);
            }
            return Err(e);
        }

        if settings.read_only {
            // query_only must flip after BEGIN; the transaction is rolled back by the caller on failure
            self.control("PRAGMA query_only = ON").await?;
            self.query_only = true;
        }

        Ok(())
    }

    async fn commit(&mut self) -> TxResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> TxResult<()> {
        self.finish("ROLLBACK").await
    }

    fn discard(self: Box<Self>) {
        let this = *self;
        drop(this.conn.detach());
    }
}

fn materialize_row(row: &SqliteRow) -> TxResult<Row> {
    use sqlx::{Column, Row as _};

    let columns = row.columns().iter().map(|col| col.name().to_string()).collect();
    let values = (0..row.len())
        .map(|index| sqlite_value_to_database_value(row, index))
        .collect::<TxResult<Vec<_>>>()?;

    Ok(Row::new(columns, values))
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(u.to_string()),
        DatabaseValue::DateTime(dt) => query.bind(dt.to_rfc3339()),
        DatabaseValue::Json(j) => query.bind(j.to_string()),
    }
}

/// Convert an SQLite value to DatabaseValue using its runtime storage class
fn sqlite_value_to_database_value(row: &SqliteRow, index: usize) -> TxResult<DatabaseValue> {
    use sqlx::{Row as _, TypeInfo, ValueRef};

    let storage_class = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(DatabaseValue::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match storage_class.as_str() {
        "INTEGER" => DatabaseValue::Int64(row.try_get(index)?),
        "REAL" => DatabaseValue::Float64(row.try_get(index)?),
        "BLOB" => DatabaseValue::Bytes(row.try_get(index)?),
        "BOOLEAN" => DatabaseValue::Bool(row.try_get(index)?),
        _ => DatabaseValue::String(row.try_get_unchecked(index)?),
    };

    Ok(value)
}
