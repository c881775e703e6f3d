use std::time::Instant;

use procura_core::config::{AppConfig, ConfigError, LoadOptions};
use procura_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::{debug, info};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not open the database pool: {0}")]
    OpenPool(#[source] sqlx::Error),
    #[error("could not apply schema migrations: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Opens the pool and brings the schema up to date. Everything else the
/// server runs (health endpoint, cart worker) layers on top of the
/// returned handle.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let started = Instant::now();

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::OpenPool)?;
    debug!(
        event_name = "system.bootstrap.pool_open",
        correlation_id = "bootstrap",
        database_url = %config.database.url,
        "database pool open"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migrate)?;

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        elapsed_ms = started.elapsed().as_millis() as u64,
        "database connected and schema current"
    );

    Ok(Application { config, db_pool })
}
