//! Transaction templates
//!
//! A template runs a unit of work inside a transaction demarcated by its
//! settings: it begins, joins, suspends or nests a transaction, runs the
//! work and commits or rolls back afterwards. The unit of work is a closure
//! returning a boxed future over the scope it is handed:
//!
//! ```ignore
//! let value = template
//!     .execute_configured(true, Propagation::Required, Isolation::Default, None, |scope| {
//!         Box::pin(async move {
//!             scope.sql("select :param").param("param", "test").query::<String>().single().await
//!         })
//!     })
//!     .await?;
//! ```

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::TransactionTemplateProperties;
use crate::definition::{DefaultTransactionSettings, Isolation, Propagation, TransactionSettings};
use crate::error::TxError;
use crate::manager::TransactionManager;
use crate::scope::TransactionScope;

/// Template with fixed transaction settings
#[derive(Debug, Clone)]
pub struct TransactionTemplate {
    manager: Arc<TransactionManager>,
    settings: TransactionSettings,
    /// Settings nested units of work start from
    defaults: TransactionSettings,
}

impl TransactionTemplate {
    pub fn new(manager: Arc<TransactionManager>, settings: TransactionSettings) -> Self {
        Self {
            manager,
            settings,
            defaults: DefaultTransactionSettings::settings(),
        }
    }

    pub fn settings(&self) -> &TransactionSettings {
        &self.settings
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Run `work` in a transaction and return its value.
    ///
    /// Errors of the unit of work come back unchanged after the transaction
    /// has been rolled back. There is no retry.
    pub async fn execute<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        self.manager.run(None, self.defaults, self.settings, work).await
    }

    pub async fn execute_without_result<E, F>(&self, work: F) -> Result<(), E>
    where
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<(), E>> + Send,
    {
        self.execute(work).await
    }
}

/// Creates templates over one transaction manager
#[derive(Debug, Clone)]
pub struct TransactionTemplateFactory {
    manager: Arc<TransactionManager>,
    defaults: TransactionSettings,
}

impl TransactionTemplateFactory {
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self::with_defaults(manager, DefaultTransactionSettings::settings())
    }

    pub fn with_defaults(manager: Arc<TransactionManager>, defaults: TransactionSettings) -> Self {
        Self { manager, defaults }
    }

    pub fn create(
        &self,
        read_only: bool,
        propagation: Propagation,
        isolation: Isolation,
        timeout: Option<Duration>,
    ) -> TransactionTemplate {
        self.create_with(TransactionSettings::new(read_only, propagation, isolation, timeout))
    }

    pub fn create_with(&self, settings: TransactionSettings) -> TransactionTemplate {
        TransactionTemplate {
            manager: Arc::clone(&self.manager),
            settings,
            defaults: self.defaults,
        }
    }

    pub fn defaults(&self) -> TransactionSettings {
        self.defaults
    }
}

/// Template whose settings are chosen per call
#[derive(Debug, Clone)]
pub struct ConfigurableTransactionTemplate {
    factory: TransactionTemplateFactory,
}

impl ConfigurableTransactionTemplate {
    /// Template using [`DefaultTransactionSettings`] when no settings are given
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self {
            factory: TransactionTemplateFactory::new(manager),
        }
    }

    pub fn with_defaults(manager: Arc<TransactionManager>, defaults: TransactionSettings) -> Self {
        Self {
            factory: TransactionTemplateFactory::with_defaults(manager, defaults),
        }
    }

    /// Template seeded from properties, or `None` when templates are disabled
    pub fn from_properties(
        manager: Arc<TransactionManager>,
        properties: &TransactionTemplateProperties,
    ) -> Option<Self> {
        if !properties.enabled {
            info!("Transaction template disabled by configuration");
            return None;
        }
        Some(Self::with_defaults(manager, properties.to_settings()))
    }

    pub fn defaults(&self) -> TransactionSettings {
        self.factory.defaults()
    }

    pub fn factory(&self) -> &TransactionTemplateFactory {
        &self.factory
    }

    pub async fn execute<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        self.execute_with(self.defaults(), work).await
    }

    pub async fn execute_with<T, E, F>(&self, settings: TransactionSettings, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        self.factory.create_with(settings).execute(work).await
    }

    /// Run `work` with the given read-only flag, propagation, isolation and timeout
    pub async fn execute_configured<T, E, F>(
        &self,
        read_only: bool,
        propagation: Propagation,
        isolation: Isolation,
        timeout: Option<Duration>,
        work: F,
    ) -> Result<T, E>
    where
        T: Send,
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<T, E>> + Send,
    {
        self.factory
            .create(read_only, propagation, isolation, timeout)
            .execute(work)
            .await
    }

    pub async fn execute_without_result<E, F>(&self, work: F) -> Result<(), E>
    where
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<(), E>> + Send,
    {
        self.execute_with(self.defaults(), work).await
    }

    pub async fn execute_without_result_with<E, F>(
        &self,
        settings: TransactionSettings,
        work: F,
    ) -> Result<(), E>
    where
        E: From<TxError> + Send,
        F: for<'s, 'c> FnOnce(&'s mut TransactionScope<'c>) -> BoxFuture<'s, Result<(), E>> + Send,
    {
        self.execute_with(settings, work).await
    }
}
