//! Background consumer for queued cart jobs. One worker per process; jobs run
//! strictly one at a time against the shared browser session.
//!
//! A job outcome only ever touches the request's cart fields and the job row.
//! The approval that queued the job is never revisited.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use thiserror::Error;

use procura_automation::{AutomationError, BrowserDriver, CartConfirmation, CartSession};
use procura_core::domain::job::CartJob;
use procura_core::vault::{CredentialVault, VaultError};
use procura_db::repositories::{
    CartJobRepository, CredentialRepository, RepositoryError, RequestRepository,
};

#[derive(Debug, Error)]
enum JobError {
    #[error("no automation credentials are configured")]
    CredentialsMissing,
    #[error("automation credentials are inactive")]
    CredentialsInactive,
    #[error("credential decryption failed: {0}")]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Automation(#[from] AutomationError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct CartWorker<D: BrowserDriver> {
    requests: Arc<dyn RequestRepository>,
    jobs: Arc<dyn CartJobRepository>,
    credentials: Arc<dyn CredentialRepository>,
    session: Arc<CartSession<D>>,
    vault: CredentialVault,
    poll_interval: Duration,
}

impl<D: BrowserDriver> CartWorker<D> {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        jobs: Arc<dyn CartJobRepository>,
        credentials: Arc<dyn CredentialRepository>,
        session: Arc<CartSession<D>>,
        vault: CredentialVault,
        poll_interval: Duration,
    ) -> Self {
        Self { requests, jobs, credentials, session, vault, poll_interval }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(error) = self.drain().await {
                tracing::error!(
                    event_name = "automation.worker.poll_failed",
                    error = %error,
                    "cart worker poll failed"
                );
            }
        }
    }

    /// Claims and processes queued jobs until the queue is empty.
    pub async fn drain(&self) -> Result<(), RepositoryError> {
        while let Some(job) = self.jobs.claim_next(Utc::now()).await? {
            self.process(job).await?;
        }
        Ok(())
    }

    async fn process(&self, job: CartJob) -> Result<(), RepositoryError> {
        match self.attempt(&job).await {
            Ok(confirmation) => {
                self.requests
                    .update_cart_outcome(
                        &job.request_id,
                        true,
                        Some(confirmation.added_at),
                        None,
                    )
                    .await?;
                self.jobs.mark_completed(&job.id, Utc::now()).await?;
                tracing::info!(
                    event_name = "automation.cart.added",
                    request_id = %job.request_id.0,
                    job_id = %job.id.0,
                    confirmed = confirmation.confirmed,
                    "product added to cart"
                );
            }
            Err(error) => {
                let message = error.to_string();
                self.requests
                    .update_cart_outcome(&job.request_id, false, None, Some(&message))
                    .await?;
                self.jobs.mark_failed(&job.id, &message, Utc::now()).await?;
                tracing::warn!(
                    event_name = "automation.cart.failed",
                    request_id = %job.request_id.0,
                    job_id = %job.id.0,
                    error = %message,
                    "cart automation attempt failed"
                );
            }
        }
        Ok(())
    }

    async fn attempt(&self, job: &CartJob) -> Result<CartConfirmation, JobError> {
        let credential =
            self.credentials.get().await?.ok_or(JobError::CredentialsMissing)?;
        if !credential.can_connect() {
            return Err(JobError::CredentialsInactive);
        }

        let password = self.vault.decrypt(&credential.encrypted_password)?;
        self.session
            .set_credentials(&credential.email, SecretString::from(password), &credential.marketplace)
            .await;
        self.session.initialize().await?;

        // A fresh login doubles as a connectivity test for the stored
        // credential; an already-live session proves nothing new.
        let fresh_login = !self.session.is_logged_in().await;
        match self.session.login().await {
            Ok(()) => {
                if fresh_login {
                    self.record_login_outcome("ok", None).await;
                }
            }
            Err(error) => {
                self.record_login_outcome("failed", Some(&error.to_string())).await;
                return Err(error.into());
            }
        }

        Ok(self.session.add_to_cart(&job.product_url, job.quantity).await?)
    }

    async fn record_login_outcome(&self, status: &str, message: Option<&str>) {
        if let Err(error) = self.credentials.record_test(status, message, Utc::now()).await {
            tracing::warn!(
                event_name = "automation.credentials.test_record_failed",
                error = %error,
                "failed to record credential test outcome"
            );
        }
    }
}
