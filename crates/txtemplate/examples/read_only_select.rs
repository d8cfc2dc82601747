//! Read-only select through a configurable transaction template
//!
//! Runs `select :param` with `param = "test"` in a read-only transaction that
//! uses the default propagation, isolation and timeout, then prints the value.
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/app cargo run --example read_only_select
//! ```
//!
//! Without `DATABASE_URL` an SQLite file in the system temp directory is used.

use std::sync::Arc;
use txtemplate::{
    ConfigurableTransactionTemplate, DefaultTransactionSettings, PoolConfig, TransactionManager,
};
use txtemplate_core::{init_logging, LoggingConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LoggingConfig::development())?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        let path = std::env::temp_dir().join("txtemplate-example.db");
        format!("sqlite://{}", path.display())
    });

    let manager = Arc::new(TransactionManager::connect(&database_url, &PoolConfig::default()).await?);
    let template = ConfigurableTransactionTemplate::new(manager);

    let value = template
        .execute_configured(
            true,
            DefaultTransactionSettings::PROPAGATION,
            DefaultTransactionSettings::ISOLATION,
            DefaultTransactionSettings::TIMEOUT,
            |scope| {
                Box::pin(async move {
                    scope
                        .sql("select :param")
                        .param("param", "test")
                        .query::<String>()
                        .single()
                        .await
                })
            },
        )
        .await?;

    println!("{}", value);
    Ok(())
}
