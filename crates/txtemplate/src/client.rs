//! SQL client bound to a transaction scope
//!
//! ```ignore
//! let greeting = scope
//!     .sql("select :param")
//!     .param("param", "test")
//!     .query::<String>()
//!     .single()
//!     .await?;
//! ```

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::debug;

use crate::backends::{DatabaseValue, Row};
use crate::error::{TxError, TxResult};
use crate::scope::TransactionScope;
use crate::sql::ParsedSql;

/// Statement with named parameters, executed in the scope it was created from
pub struct Statement<'s, 'c> {
    scope: &'s mut TransactionScope<'c>,
    sql: String,
    params: HashMap<String, DatabaseValue>,
}

impl<'s, 'c> Statement<'s, 'c> {
    pub(crate) fn new(scope: &'s mut TransactionScope<'c>, sql: String) -> Self {
        Self {
            scope,
            sql,
            params: HashMap::new(),
        }
    }

    /// Bind `value` to every `:name` placeholder; a later bind replaces an earlier one
    pub fn param(mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        self.params
            .extend(params.into_iter().map(|(name, value)| (name.into(), value.into())));
        self
    }

    /// Execute an INSERT/UPDATE/DELETE/DDL statement, returning the affected row count
    pub async fn update(self) -> TxResult<u64> {
        let (sql, params) = self.prepare()?;
        let conn = self.scope.connection().await?;
        conn.execute(&sql, &params).await
    }

    /// Execute a query and return every row
    pub async fn rows(self) -> TxResult<Vec<Row>> {
        let (sql, params) = self.prepare()?;
        let conn = self.scope.connection().await?;
        conn.fetch_all(&sql, &params).await
    }

    /// Map each row's single column to `T`
    pub fn query<T: DeserializeOwned>(self) -> MappedQuery<'s, 'c, T> {
        MappedQuery {
            statement: self,
            _marker: PhantomData,
        }
    }

    fn prepare(&self) -> TxResult<(String, Vec<DatabaseValue>)> {
        let (sql, params) = ParsedSql::parse(&self.sql).expand(self.scope.backend(), &self.params)?;
        debug!(
            transaction_id = ?self.scope.status().transaction_id(),
            params = params.len(),
            "{}",
            sql
        );
        Ok((sql, params))
    }
}

impl std::fmt::Debug for Statement<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("params", &self.params)
            .finish()
    }
}

/// Statement whose rows decode into a scalar `T`
pub struct MappedQuery<'s, 'c, T> {
    statement: Statement<'s, 'c>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> MappedQuery<'_, '_, T> {
    /// Exactly one row is required
    pub async fn single(self) -> TxResult<T> {
        let rows = self.statement.rows().await?;
        match rows.as_slice() {
            [row] => decode_scalar(row),
            _ => Err(TxError::IncorrectResultSize {
                expected: 1,
                actual: rows.len(),
            }),
        }
    }

    /// Zero or one row
    pub async fn optional(self) -> TxResult<Option<T>> {
        let rows = self.statement.rows().await?;
        match rows.as_slice() {
            [] => Ok(None),
            [row] => decode_scalar(row).map(Some),
            _ => Err(TxError::IncorrectResultSize {
                expected: 1,
                actual: rows.len(),
            }),
        }
    }

    pub async fn list(self) -> TxResult<Vec<T>> {
        let rows = self.statement.rows().await?;
        rows.iter().map(decode_scalar).collect()
    }
}

fn decode_scalar<T: DeserializeOwned>(row: &Row) -> TxResult<T> {
    if row.column_count() != 1 {
        return Err(TxError::IncorrectColumnCount {
            expected: 1,
            actual: row.column_count(),
        });
    }
    row.get_by_index(0)?.decode()
}
