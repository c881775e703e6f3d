use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use procura_core::domain::credential::AutomationCredential;
use procura_core::domain::history::HistoryEntry;
use procura_core::domain::job::{CartJob, CartJobId};
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestStatus};

pub mod cart_job;
pub mod credential;
pub mod memory;
pub mod request;

pub use cart_job::SqlCartJobRepository;
pub use credential::SqlCredentialRepository;
pub use memory::{InMemoryCartJobRepository, InMemoryCredentialRepository, InMemoryRequestRepository};
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

// Timestamps and counters are stored as TEXT / INTEGER; these decode them
// back with the offending column named in the error.

pub(crate) fn decode_utc(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    let parsed = DateTime::parse_from_rfc3339(&value).map_err(|error| {
        RepositoryError::Decode(format!(
            "column `{column}` holds a bad timestamp `{value}`: {error}"
        ))
    })?;
    Ok(parsed.with_timezone(&Utc))
}

pub(crate) fn decode_utc_opt(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|raw| decode_utc(column, raw)).transpose()
}

pub(crate) fn decode_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("column `{column}` holds a negative count: {value}"))
    })
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId)
        -> Result<Option<PurchaseRequest>, RepositoryError>;

    async fn list(&self) -> Result<Vec<PurchaseRequest>, RepositoryError>;

    /// Inserts the request together with its creation history entry.
    async fn create(
        &self,
        request: &PurchaseRequest,
        history: &HistoryEntry,
    ) -> Result<(), RepositoryError>;

    /// Persists `updated` and appends `history` in one transaction, but only
    /// when the stored status still equals `expected_status`. Returns false
    /// when the guard loses, leaving the row untouched.
    async fn apply_transition(
        &self,
        updated: &PurchaseRequest,
        expected_status: RequestStatus,
        history: &HistoryEntry,
    ) -> Result<bool, RepositoryError>;

    /// Guarded field update for requester edits that leave status alone. No
    /// history entry is written. Returns false when the guard loses.
    async fn update_details(
        &self,
        updated: &PurchaseRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, RepositoryError>;

    /// Narrow write for automation outcomes; never touches status or
    /// decision metadata.
    async fn update_cart_outcome(
        &self,
        id: &RequestId,
        added_to_cart: bool,
        added_to_cart_at: Option<DateTime<Utc>>,
        cart_error: Option<&str>,
    ) -> Result<(), RepositoryError>;

    async fn list_history(&self, id: &RequestId) -> Result<Vec<HistoryEntry>, RepositoryError>;

    async fn count_created_in_year(&self, year: i32) -> Result<u32, RepositoryError>;

    async fn status_counts(&self) -> Result<HashMap<RequestStatus, u32>, RepositoryError>;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn get(&self) -> Result<Option<AutomationCredential>, RepositoryError>;
    async fn upsert(&self, credential: &AutomationCredential) -> Result<(), RepositoryError>;

    /// Records the outcome of the latest login attempt against the stored
    /// credential. No-op when no credential row exists yet.
    async fn record_test(
        &self,
        status: &str,
        message: Option<&str>,
        tested_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CartJobRepository: Send + Sync {
    async fn enqueue(&self, job: &CartJob) -> Result<(), RepositoryError>;

    /// Flips the oldest queued job to running and bumps its attempt counter.
    /// Returns None when the queue is empty.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<CartJob>, RepositoryError>;

    async fn mark_completed(
        &self,
        id: &CartJobId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn mark_failed(
        &self,
        id: &CartJobId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Puts a failed job back on the queue. Returns false when the job is not
    /// currently failed.
    async fn requeue(&self, id: &CartJobId, now: DateTime<Utc>) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: &CartJobId) -> Result<Option<CartJob>, RepositoryError>;

    async fn latest_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<CartJob>, RepositoryError>;
}
