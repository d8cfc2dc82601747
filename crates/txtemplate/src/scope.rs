//! Transaction scopes handed to units of work

use futures::future::BoxFuture;

use crate::backends::{BackendConnection, BackendKind};
use crate::client::Statement;
use crate::definition::TransactionSettings;
use crate::error::{TxError, TxResult};
use crate::manager::{PhysicalTransaction, TransactionManager};

/// State of the transaction a unit of work runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStatus {
    transaction_id: Option<u64>,
    new_transaction: bool,
    read_only: bool,
    savepoint: Option<String>,
    rollback_only: bool,
}

impl TransactionStatus {
    pub(crate) fn new_transaction(id: u64, read_only: bool) -> Self {
        Self {
            transaction_id: Some(id),
            new_transaction: true,
            read_only,
            savepoint: None,
            rollback_only: false,
        }
    }

    pub(crate) fn participating(id: u64, read_only: bool) -> Self {
        Self {
            new_transaction: false,
            ..Self::new_transaction(id, read_only)
        }
    }

    pub(crate) fn nested(id: u64, read_only: bool, savepoint: String) -> Self {
        Self {
            savepoint: Some(savepoint),
            ..Self::participating(id, read_only)
        }
    }

    pub(crate) fn without_transaction(read_only: bool) -> Self {
        Self {
            transaction_id: None,
            new_transaction: false,
            read_only,
            savepoint: None,
            rollback_only: false,
        }
    }

    /// Id of the physical transaction; shared by every scope that joined it
    pub fn transaction_id(&self) -> Option<u64> {
        self.transaction_id
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction_id.is_some()
    }

    /// Whether this scope began the physical transaction
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn savepoint(&self) -> Option<&str> {
        self.savepoint.as_deref()
    }

    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    /// Rollback requested by this scope itself
    pub fn is_local_rollback_only(&self) -> bool {
        self.rollback_only
    }
}

/// What a scope executes its statements on
pub(crate) enum Binding<'c> {
    /// Physical transaction, owned by the enclosing `run` call or joined
    Transaction(&'c mut PhysicalTransaction),
    /// No transaction; a connection is acquired on the first statement
    Detached(Option<Box<dyn BackendConnection>>),
}

/// Handle passed to a unit of work.
///
/// Statements issued through [`TransactionScope::sql`] run in the scope's
/// transaction (or in autocommit mode when there is none). Nested units of
/// work started with [`TransactionScope::execute_with`] see this scope's
/// transaction as the existing one.
pub struct TransactionScope<'c> {
    manager: &'c TransactionManager,
    defaults: TransactionSettings,
    binding: Binding<'c>,
    status: TransactionStatus,
}

impl<'c> TransactionScope<'c> {
    pub(crate) fn new(
        manager: &'c TransactionManager,
        defaults: TransactionSettings,
        binding: Binding<'c>,
        status: TransactionStatus,
    ) -> Self {
        Self {
            manager,
            defaults,
            binding,
            status,
        }
    }

    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Roll back instead of committing once the unit of work returns.
    ///
    /// In a participating scope this dooms the whole existing transaction.
    pub fn set_rollback_only(&mut self) {
        self.status.rollback_only = true;
    }

    /// Whether this scope or any participant requested a rollback
    pub fn is_rollback_only(&self) -> bool {
        self.status.rollback_only
            || matches!(&self.binding, Binding::Transaction(tx) if tx.rollback_only)
    }

    /// Settings nested units of work start from
    pub fn defaults(&self) -> TransactionSettings {
        self.defaults
    }

    pub fn backend(&self) -> BackendKind {
        self.manager.backend()
    }

    /// Start a statement with `:name` placeholders
    pub fn sql(&mut self, sql: impl Into<String>) -> Statement<'_, 'c> {
        Statement::new(self, sql.into())
    }

    /// Run a nested unit of work with the default settings
    pub async fn execute<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'x> FnOnce(&'s mut TransactionScope<'x>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        let settings = self.defaults;
        self.execute_with(settings, work).await
    }

    /// Run a nested unit of work; this scope's transaction is the existing one
    pub async fn execute_with<T, E, F>(&mut self, settings: TransactionSettings, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'x> FnOnce(&'s mut TransactionScope<'x>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        let manager = self.manager;
        let defaults = self.defaults;
        let outer = match &mut self.binding {
            Binding::Transaction(tx) => Some(&mut **tx),
            Binding::Detached(_) => None,
        };
        manager.run(outer, defaults, settings, work).await
    }

    /// Connection statements of this scope run on
    pub(crate) async fn connection(&mut self) -> TxResult<&mut Box<dyn BackendConnection>> {
        let manager = self.manager;
        match &mut self.binding {
            Binding::Transaction(tx) => tx.connection(),
            Binding::Detached(slot) => {
                if slot.is_none() {
                    *slot = Some(manager.acquire().await?);
                }
                slot.as_mut()
                    .ok_or_else(|| TxError::Connection("No connection bound to scope".to_string()))
            }
        }
    }
}

impl std::fmt::Debug for TransactionScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("status", &self.status)
            .field("defaults", &self.defaults)
            .finish()
    }
}
