mod approvals;
mod bootstrap;
mod health;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use secrecy::ExposeSecret;

use procura_automation::{CartSession, SessionConfig, WebDriverClient};
use procura_core::config::{AppConfig, LoadOptions};
use procura_core::vault::CredentialVault;
use procura_db::repositories::{
    CartJobRepository, CredentialRepository, RequestRepository, SqlCartJobRepository,
    SqlCredentialRepository, SqlRequestRepository,
};

use approvals::ApprovalService;
use worker::CartWorker;

fn init_logging(config: &AppConfig) {
    use procura_core::config::LogFormat;

    let level =
        config.logging.level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(level);
    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before anything that might want to emit events.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        app.config.automation.enabled,
    )
    .await?;

    let requests: Arc<dyn RequestRepository> =
        Arc::new(SqlRequestRepository::new(app.db_pool.clone()));
    let jobs: Arc<dyn CartJobRepository> =
        Arc::new(SqlCartJobRepository::new(app.db_pool.clone()));

    // Transition operations for whatever interface layer fronts this process;
    // the binary itself only drives health checks and the cart worker.
    let approvals = Arc::new(ApprovalService::new(
        requests.clone(),
        jobs.clone(),
        app.config.automation.enabled,
    ));
    let _ = &approvals;

    if app.config.automation.enabled {
        let automation = &app.config.automation;
        let vault = CredentialVault::new(app.config.vault.key.expose_secret().as_bytes())?;
        let driver = WebDriverClient::new(
            &automation.webdriver_url,
            Duration::from_secs(automation.timeout_secs),
        )?;
        let session = Arc::new(CartSession::new(
            driver,
            SessionConfig {
                marketplace: automation.marketplace.clone(),
                timeout: Duration::from_secs(automation.timeout_secs),
                confirmation: automation.confirmation,
                ..SessionConfig::default()
            },
        ));
        let credentials: Arc<dyn CredentialRepository> =
            Arc::new(SqlCredentialRepository::new(app.db_pool.clone()));

        let worker = CartWorker::new(
            requests.clone(),
            jobs.clone(),
            credentials,
            session,
            vault,
            Duration::from_secs(automation.poll_interval_secs),
        );
        tokio::spawn(worker.run());
        tracing::info!(
            event_name = "system.server.worker_started",
            correlation_id = "bootstrap",
            webdriver_url = %automation.webdriver_url,
            marketplace = %automation.marketplace,
            "cart automation worker started"
        );
    } else {
        tracing::info!(
            event_name = "system.server.worker_disabled",
            correlation_id = "bootstrap",
            "cart automation disabled by configuration"
        );
    }

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "procura-server started"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "procura-server stopping"
    );
    Ok(())
}
