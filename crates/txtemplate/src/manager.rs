//! Transaction Management
//!
//! Applies propagation rules, drives physical transactions on pooled
//! connections and completes them once the unit of work has finished.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backends::{BackendConnection, BackendKind, ConnectionSource};
use crate::database::{self, PoolConfig};
use crate::definition::{Isolation, Propagation, TransactionSettings};
use crate::error::{TxError, TxResult};
use crate::scope::{Binding, TransactionScope, TransactionStatus};

/// Begins, joins, suspends and nests transactions on top of a connection source
pub struct TransactionManager {
    source: Arc<dyn ConnectionSource>,
    next_transaction_id: AtomicU64,
}

impl TransactionManager {
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            source,
            next_transaction_id: AtomicU64::new(0),
        }
    }

    /// Open a pool for `database_url` and manage transactions on it
    pub async fn connect(database_url: &str, config: &PoolConfig) -> TxResult<Self> {
        Ok(Self::new(database::connect(database_url, config).await?))
    }

    pub fn backend(&self) -> BackendKind {
        self.source.backend()
    }

    pub fn source(&self) -> &Arc<dyn ConnectionSource> {
        &self.source
    }

    pub(crate) async fn acquire(&self) -> TxResult<Box<dyn BackendConnection>> {
        self.source.acquire().await
    }

    /// Run `work` with `settings`, relative to the enclosing transaction `outer`
    pub(crate) async fn run<T, E, F>(
        &self,
        outer: Option<&mut PhysicalTransaction>,
        defaults: TransactionSettings,
        settings: TransactionSettings,
        work: F,
    ) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        use Propagation::*;

        match (settings.propagation, outer) {
            (Mandatory, None) => Err(TxError::IllegalTransactionState(
                "No existing transaction found for transaction marked with propagation 'mandatory'"
                    .to_string(),
            )
            .into()),
            (Never, Some(_)) => Err(TxError::IllegalTransactionState(
                "Existing transaction found for transaction marked with propagation 'never'"
                    .to_string(),
            )
            .into()),
            (Required | Supports | Mandatory, Some(outer)) => {
                self.participate(outer, defaults, settings, work).await
            }
            (Nested, Some(outer)) => self.nest(outer, defaults, settings, work).await,
            (RequiresNew, Some(outer)) => {
                debug!(transaction_id = outer.id, "Suspending current transaction, creating new transaction");
                self.begin_new(defaults, settings, work).await
            }
            (Required | RequiresNew | Nested, None) => self.begin_new(defaults, settings, work).await,
            (NotSupported, Some(outer)) => {
                debug!(transaction_id = outer.id, "Suspending current transaction");
                self.run_without_transaction(defaults, settings, work).await
            }
            (Supports | NotSupported | Never, None) => {
                self.run_without_transaction(defaults, settings, work).await
            }
        }
    }

    async fn begin_new<T, E, F>(
        &self,
        defaults: TransactionSettings,
        settings: TransactionSettings,
        work: F,
    ) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        let id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            transaction_id = id,
            propagation = %settings.propagation,
            isolation = %settings.isolation,
            read_only = settings.read_only,
            "Creating new transaction"
        );

        let mut conn = self.acquire().await?;
        if let Err(e) = conn.begin(&settings).await {
            warn!(transaction_id = id, "Failed to begin transaction: {}", e);
            conn.discard();
            return Err(e.into());
        }

        let mut tx = PhysicalTransaction::new(id, conn, &settings);
        let deadline = tx.deadline;

        let mut scope = TransactionScope::new(
            self,
            defaults,
            Binding::Transaction(&mut tx),
            TransactionStatus::new_transaction(id, settings.read_only),
        );
        let outcome = run_with_deadline(&mut scope, deadline, work).await;
        let local_rollback_only = scope.status().is_local_rollback_only();
        drop(scope);

        match outcome {
            Ok(Ok(value)) if local_rollback_only => {
                debug!(transaction_id = id, "Transactional code has requested rollback");
                tx.rollback().await?;
                Ok(value)
            }
            Ok(Ok(_)) if tx.rollback_only => {
                debug!(transaction_id = id, "Global transaction is marked as rollback-only");
                tx.rollback().await?;
                Err(TxError::UnexpectedRollback(
                    "Transaction silently rolled back because it has been marked as rollback-only"
                        .to_string(),
                )
                .into())
            }
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                tx.rollback_on_failure().await;
                Err(err)
            }
            Err(timeout) => {
                tx.rollback_on_failure().await;
                Err(timeout.into())
            }
        }
    }

    async fn participate<T, E, F>(
        &self,
        outer: &mut PhysicalTransaction,
        defaults: TransactionSettings,
        settings: TransactionSettings,
        work: F,
    ) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        debug!(
            transaction_id = outer.id,
            propagation = %settings.propagation,
            "Participating in existing transaction"
        );
        if settings.isolation != Isolation::Default && settings.isolation != outer.isolation {
            debug!(
                transaction_id = outer.id,
                requested = %settings.isolation,
                actual = %outer.isolation,
                "Participating transaction keeps the isolation level of the existing transaction"
            );
        }
        if !settings.read_only && outer.read_only {
            debug!(
                transaction_id = outer.id,
                "Participating transaction is not read-only but the existing transaction is"
            );
        }

        let deadline = outer.deadline;
        let status = TransactionStatus::participating(outer.id, outer.read_only);
        let mut scope = TransactionScope::new(self, defaults, Binding::Transaction(&mut *outer), status);
        let outcome = run_with_deadline(&mut scope, deadline, work).await;
        let local_rollback_only = scope.status().is_local_rollback_only();
        drop(scope);

        match outcome {
            Ok(Ok(value)) => {
                if local_rollback_only {
                    debug!(
                        transaction_id = outer.id,
                        "Participating transaction requested rollback - marking existing transaction as rollback-only"
                    );
                    outer.rollback_only = true;
                }
                Ok(value)
            }
            Ok(Err(err)) => {
                debug!(
                    transaction_id = outer.id,
                    "Participating transaction failed - marking existing transaction as rollback-only"
                );
                outer.rollback_only = true;
                Err(err)
            }
            Err(timeout) => {
                outer.rollback_only = true;
                Err(timeout.into())
            }
        }
    }

    async fn nest<T, E, F>(
        &self,
        outer: &mut PhysicalTransaction,
        defaults: TransactionSettings,
        settings: TransactionSettings,
        work: F,
    ) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        let savepoint = outer.next_savepoint_name();
        debug!(
            transaction_id = outer.id,
            savepoint = %savepoint,
            read_only = settings.read_only,
            "Creating nested transaction"
        );
        outer.connection()?.create_savepoint(&savepoint).await?;
        // Participants inside the savepoint may mark the transaction rollback-only
        let rollback_only_before = outer.rollback_only;

        let deadline = outer.deadline;
        let status = TransactionStatus::nested(outer.id, outer.read_only, savepoint.clone());
        let mut scope = TransactionScope::new(self, defaults, Binding::Transaction(&mut *outer), status);
        let outcome = run_with_deadline(&mut scope, deadline, work).await;
        let local_rollback_only = scope.status().is_local_rollback_only();
        drop(scope);
        let doomed_inside = outer.rollback_only && !rollback_only_before;

        match outcome {
            Ok(Ok(_)) if doomed_inside => {
                debug!(
                    transaction_id = outer.id,
                    savepoint = %savepoint,
                    "Participant marked nested transaction as rollback-only - rolling back to savepoint"
                );
                outer.rollback_to_savepoint(&savepoint, rollback_only_before).await?;
                Err(TxError::UnexpectedRollback(format!(
                    "Nested transaction rolled back to {} because it has been marked as rollback-only",
                    savepoint
                ))
                .into())
            }
            Ok(Ok(value)) if local_rollback_only => {
                debug!(transaction_id = outer.id, savepoint = %savepoint, "Rolling back nested transaction on request");
                outer.rollback_to_savepoint(&savepoint, rollback_only_before).await?;
                Ok(value)
            }
            Ok(Ok(value)) => {
                outer.release_savepoint(&savepoint).await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(e) = outer.rollback_to_savepoint(&savepoint, rollback_only_before).await {
                    warn!(transaction_id = outer.id, savepoint = %savepoint, "Failed to roll back to savepoint: {}", e);
                }
                Err(err)
            }
            Err(timeout) => {
                if let Err(e) = outer.rollback_to_savepoint(&savepoint, rollback_only_before).await {
                    warn!(transaction_id = outer.id, savepoint = %savepoint, "Failed to roll back to savepoint: {}", e);
                }
                Err(timeout.into())
            }
        }
    }

    async fn run_without_transaction<T, E, F>(
        &self,
        defaults: TransactionSettings,
        settings: TransactionSettings,
        work: F,
    ) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        debug!(propagation = %settings.propagation, "Executing without transaction");

        let mut scope = TransactionScope::new(
            self,
            defaults,
            Binding::Detached(None),
            TransactionStatus::without_transaction(settings.read_only),
        );
        let result = work(&mut scope).await;

        if scope.status().is_local_rollback_only() {
            debug!("Ignoring rollback-only flag: no transaction is active");
        }

        result
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("backend", &self.backend())
            .field("transactions_started", &self.next_transaction_id.load(Ordering::Relaxed))
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    timeout: Duration,
}

async fn run_with_deadline<'c, T, E, F>(
    scope: &mut TransactionScope<'c>,
    deadline: Option<Deadline>,
    work: F,
) -> Result<Result<T, E>, TxError>
where
    F: for<'s, 'x> FnOnce(&'s mut TransactionScope<'x>) -> BoxFuture<'s, Result<T, E>>,
{
    let future = work(scope);
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.at, future)
            .await
            .map_err(|_| TxError::Timeout {
                timeout: deadline.timeout,
            }),
        None => Ok(future.await),
    }
}

/// A transaction open on one pooled connection
pub(crate) struct PhysicalTransaction {
    pub(crate) id: u64,
    conn: Option<Box<dyn BackendConnection>>,
    pub(crate) read_only: bool,
    pub(crate) isolation: Isolation,
    deadline: Option<Deadline>,
    /// Set by participants; the owner must not commit
    pub(crate) rollback_only: bool,
    savepoint_counter: u32,
    completed: bool,
}

impl PhysicalTransaction {
    fn new(id: u64, conn: Box<dyn BackendConnection>, settings: &TransactionSettings) -> Self {
        Self {
            id,
            conn: Some(conn),
            read_only: settings.read_only,
            isolation: settings.isolation,
            deadline: settings.timeout.and_then(|timeout| {
                Instant::now()
                    .checked_add(timeout)
                    .map(|at| Deadline { at, timeout })
            }),
            rollback_only: false,
            savepoint_counter: 0,
            completed: false,
        }
    }

    pub(crate) fn connection(&mut self) -> TxResult<&mut Box<dyn BackendConnection>> {
        if self.completed {
            return Err(TxError::IllegalTransactionState(format!(
                "Transaction {} is already completed",
                self.id
            )));
        }
        self.conn
            .as_mut()
            .ok_or_else(|| TxError::Connection(format!("Transaction {} has no connection", self.id)))
    }

    fn next_savepoint_name(&mut self) -> String {
        self.savepoint_counter += 1;
        format!("SAVEPOINT_{}", self.savepoint_counter)
    }

    async fn commit(&mut self) -> TxResult<()> {
        debug!(transaction_id = self.id, "Committing transaction");
        let result = self.connection()?.commit().await;
        match result {
            Ok(()) => {
                self.completed = true;
                Ok(())
            }
            Err(e) => {
                warn!(transaction_id = self.id, "Commit failed, rolling back: {}", e);
                self.rollback_on_failure().await;
                Err(e)
            }
        }
    }

    async fn rollback(&mut self) -> TxResult<()> {
        debug!(transaction_id = self.id, "Rolling back transaction");
        self.connection()?.rollback().await?;
        self.completed = true;
        Ok(())
    }

    /// Best-effort rollback while another error is already being reported
    async fn rollback_on_failure(&mut self) {
        if let Err(e) = self.rollback().await {
            warn!(
                transaction_id = self.id,
                "Rollback after failure did not succeed, connection will be discarded: {}", e
            );
        }
    }

    /// Undo the work done since `savepoint` and restore the rollback-only flag it was
    /// created with; on failure the whole transaction is doomed
    async fn rollback_to_savepoint(&mut self, savepoint: &str, rollback_only: bool) -> TxResult<()> {
        let result = self.undo_savepoint(savepoint).await;
        self.rollback_only = result.is_err() || rollback_only;
        result
    }

    async fn undo_savepoint(&mut self, savepoint: &str) -> TxResult<()> {
        let conn = self.connection()?;
        conn.rollback_to_savepoint(savepoint).await?;
        conn.release_savepoint(savepoint).await
    }

    async fn release_savepoint(&mut self, savepoint: &str) -> TxResult<()> {
        self.connection()?.release_savepoint(savepoint).await
    }
}

impl Drop for PhysicalTransaction {
    /// A transaction that was neither committed nor rolled back must not go back to the pool
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.completed {
                warn!(
                    transaction_id = self.id,
                    "Transaction dropped without commit or rollback - discarding its connection"
                );
                conn.discard();
            }
        }
    }
}
