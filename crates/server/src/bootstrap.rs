use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use timebank_core::config::{AppConfig, ConfigError};
use timebank_db::{
    connect_with_settings, migrations, DbPool, SqlAuditLog, SqlDocumentStore, SqlLedgerStore,
};
use timebank_engine::{ApprovalEngine, DocumentGateway, LedgerService, NoopNotifier};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub gateway: DocumentGateway,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let audit = Arc::new(SqlAuditLog::new(db_pool.clone()));
    let ledger = LedgerService::new(Arc::new(SqlLedgerStore::new(db_pool.clone())), audit.clone());
    let engine = ApprovalEngine::new(
        Arc::new(SqlDocumentStore::new(db_pool.clone())),
        ledger.clone(),
        audit,
        Arc::new(NoopNotifier),
    );
    let gateway =
        DocumentGateway::new(engine, ledger, config.jobs.manual_deduction_min_privilege);

    Ok(Application { config, db_pool, gateway })
}

#[cfg(test)]
mod tests {
    use timebank_core::config::AppConfig;

    use super::bootstrap_with_config;

    #[tokio::test]
    async fn bootstrap_connects_and_migrates_an_in_memory_database() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        // A multi-connection pool would hand each connection its own
        // private in-memory database.
        config.database.max_connections = 1;

        let app = bootstrap_with_config(config).await.expect("bootstrap");

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'document'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(count, 1);
    }
}
