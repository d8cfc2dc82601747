//! # txtemplate
//!
//! Programmatic transaction demarcation over PostgreSQL and SQLite.
//!
//! A [`ConfigurableTransactionTemplate`] runs a unit of work with a read-only
//! flag, a [`Propagation`] behaviour, an [`Isolation`] level and an optional
//! timeout. The unit of work receives a [`TransactionScope`] to run
//! `:name`-parameterized statements and start nested units of work.
//!
//! ```ignore
//! let manager = Arc::new(TransactionManager::connect(&url, &PoolConfig::default()).await?);
//! let template = ConfigurableTransactionTemplate::new(manager);
//!
//! let value: String = template
//!     .execute_configured(
//!         true,
//!         DefaultTransactionSettings::PROPAGATION,
//!         DefaultTransactionSettings::ISOLATION,
//!         DefaultTransactionSettings::TIMEOUT,
//!         |scope| {
//!             Box::pin(async move {
//!                 scope.sql("select :param").param("param", "test").query().single().await
//!             })
//!         },
//!     )
//!     .await?;
//! ```

pub mod backends;
pub mod client;
pub mod config;
pub mod database;
pub mod definition;
pub mod error;
pub mod manager;
pub mod scope;
pub mod sql;
pub mod template;

pub use backends::{BackendConnection, BackendKind, ConnectionSource, DatabaseValue, Row};
pub use client::{MappedQuery, Statement};
pub use config::{DefaultProperties, TransactionTemplateProperties};
pub use database::PoolConfig;
pub use definition::{DefaultTransactionSettings, Isolation, Propagation, TransactionSettings};
pub use error::{TxError, TxResult};
pub use manager::TransactionManager;
pub use scope::{TransactionScope, TransactionStatus};
pub use sql::ParsedSql;
pub use template::{ConfigurableTransactionTemplate, TransactionTemplate, TransactionTemplateFactory};

pub use futures::future::BoxFuture;
pub use txtemplate_core::EnvConfig;
