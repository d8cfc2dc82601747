//! PostgreSQL Backend Implementation
//!
//! PostgreSQL implementation of the backend traits using sqlx as the
//! underlying database driver.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Postgres};
use std::time::Duration;
use tracing::debug;

use super::core::*;
use super::BackendKind;
use crate::database::PoolConfig;
use crate::definition::TransactionSettings;
use crate::error::{TxError, TxResult};

/// PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    /// Create a pool for `database_url`
    pub async fn connect(database_url: &str, config: &PoolConfig) -> TxResult<Self> {
        let mut options = PgPoolOptions::new()
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
            .connect(database_url)
            .await
            .map_err(|e| TxError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing sqlx pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for PostgresSource {
    async fn acquire(&self) -> TxResult<Box<dyn BackendConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| TxError::Connection(format!("Failed to acquire connection: {}", e)))?;

        Ok(Box::new(PostgresConnection { conn }))
    }

    fn backend(&self) -> BackendKind {
        BackendKind::PostgreSQL
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// PostgreSQL connection implementation
pub struct PostgresConnection {
    conn: PoolConnection<Postgres>,
}

impl PostgresConnection {
    async fn control(&mut self, sql: &str) -> TxResult<()> {
        debug!(target: "txtemplate::postgres", "{}", sql);
        (&mut *self.conn).execute(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl BackendConnection for PostgresConnection {
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
        self.control(&start_transaction_sql(settings)).await
    }

    async fn commit(&mut self) -> TxResult<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> TxResult<()> {
        self.control("ROLLBACK").await
    }

    fn discard(self: Box<Self>) {
        let this = *self;
        drop(this.conn.detach());
    }
}

/// `START TRANSACTION` statement carrying isolation level and access mode
fn start_transaction_sql(settings: &TransactionSettings) -> String {
    let mut sql = String::from("START TRANSACTION");

    if let Some(isolation) = settings.isolation.as_sql() {
        sql.push_str(" ISOLATION LEVEL ");
        sql.push_str(isolation);
    }

    if settings.read_only {
        sql.push_str(" READ ONLY");
    } else {
        sql.push_str(" READ WRITE");
    }

    sql
}

fn materialize_row(row: &PgRow) -> TxResult<Row> {
    use sqlx::{Column, Row as _};

    let columns = row.columns().iter().map(|col| col.name().to_string()).collect();
    let values = (0..row.len())
        .map(|index| postgres_value_to_database_value(row, index))
        .collect::<TxResult<Vec<_>>>()?;

    Ok(Row::new(columns, values))
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(*u),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> TxResult<DatabaseValue> {
    use sqlx::{Column, Row as _, TypeInfo, ValueRef};

    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let column = &row.columns()[index];
    let type_name = column.type_info().name();

    let value = match type_name {
        "BOOL" => DatabaseValue::Bool(row.try_get(index)?),
        "INT2" => DatabaseValue::Int32(row.try_get::<i16, _>(index)?.into()),
        "INT4" => DatabaseValue::Int32(row.try_get(index)?),
        "INT8" => DatabaseValue::Int64(row.try_get(index)?),
        "FLOAT4" => DatabaseValue::Float64(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => DatabaseValue::String(row.try_get(index)?),
        "BYTEA" => DatabaseValue::Bytes(row.try_get(index)?),
        "UUID" => DatabaseValue::Uuid(row.try_get(index)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index)?),
        "TIMESTAMP" => {
            let naive: chrono::NaiveDateTime = row.try_get(index)?;
            DatabaseValue::DateTime(chrono::DateTime::from_naive_utc_and_offset(naive, chrono::Utc))
        }
        "DATE" => DatabaseValue::String(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIME" => DatabaseValue::String(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "JSON" | "JSONB" => DatabaseValue::Json(row.try_get::<JsonValue, _>(index)?),
        _ => {
            // Fallback: try to get as string
            let value: String = row.try_get(index).map_err(|e| {
                TxError::Decode(format!(
                    "Failed to get value as string for unsupported type '{}': {}",
                    type_name, e
                ))
            })?;
            DatabaseValue::String(value)
        }
    };

    Ok(value)
}
