#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;
use txtemplate::{ConfigurableTransactionTemplate, PoolConfig, TransactionManager, TxResult};

/// SQLite database in a temporary directory with an `accounts` table
pub struct TestDatabase {
    pub manager: Arc<TransactionManager>,
    _dir: TempDir,
}

impl TestDatabase {
    pub async fn new() -> Self {
        Self::with_pool(PoolConfig::default().with_max_connections(4).with_min_connections(0)).await
    }

    pub async fn with_pool(config: PoolConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let manager = Arc::new(
            TransactionManager::connect(&url, &config)
                .await
                .expect("Failed to open test database"),
        );

        let db = Self { manager, _dir: dir };
        db.template()
            .execute_without_result(|scope| {
                Box::pin(async move {
                    scope
                        .sql("create table accounts (id integer primary key autoincrement, name text not null)")
                        .update()
                        .await
                        .map(|_| ())
                })
            })
            .await
            .expect("Failed to create accounts table");
        db
    }

    pub fn template(&self) -> ConfigurableTransactionTemplate {
        ConfigurableTransactionTemplate::new(Arc::clone(&self.manager))
    }

    /// Committed account names in insertion order
    pub async fn names(&self) -> Vec<String> {
        let result: TxResult<Vec<String>> = self
            .template()
            .execute(|scope| {
                Box::pin(async move {
                    scope
                        .sql("select name from accounts order by id")
                        .query::<String>()
                        .list()
                        .await
                })
            })
            .await;
        result.expect("Failed to read accounts")
    }

    pub async fn count(&self) -> usize {
        self.names().await.len()
    }
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("txtemplate=debug")
        .with_test_writer()
        .try_init();
}
