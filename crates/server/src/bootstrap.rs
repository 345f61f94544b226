use std::sync::Arc;

use backoffice_core::audit::TracingAuditSink;
use backoffice_core::config::{AppConfig, ConfigError, LoadOptions};
use backoffice_db::{
    connect, migrations, DbPool, LocalDocumentStore, SqlRequestRepository, StorageError,
};
use thiserror::Error;
use tracing::info;

use crate::auth::ApiToken;
use crate::service::WorkflowService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<WorkflowService>,
    pub api_token: ApiToken,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("document storage is not usable: {0}")]
    Storage(#[source] StorageError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let store = LocalDocumentStore::new(config.documents.storage_root.clone());
    store.ensure_ready().await.map_err(BootstrapError::Storage)?;
    info!(
        event_name = "system.bootstrap.storage_ready",
        correlation_id = "bootstrap",
        storage_root = %store.root().display(),
        "document storage ready"
    );

    let service = WorkflowService::new(
        Arc::new(SqlRequestRepository::new(db_pool.clone())),
        Arc::new(store),
        Arc::new(TracingAuditSink),
        config.documents.max_upload_bytes,
        config.auth.consent_token_ttl_hours,
    );
    let api_token = ApiToken::new(&config.auth.api_token);

    Ok(Application { config, db_pool, service: Arc::new(service), api_token })
}
