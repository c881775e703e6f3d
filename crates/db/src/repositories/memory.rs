use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use procura_core::domain::credential::AutomationCredential;
use procura_core::domain::history::HistoryEntry;
use procura_core::domain::job::{CartJob, CartJobId, CartJobState};
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestStatus};

use super::{CartJobRepository, CredentialRepository, RepositoryError, RequestRepository};

/// Test double with the same status-guard semantics as the SQL repository.
#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, PurchaseRequest>>,
    history: RwLock<Vec<HistoryEntry>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<PurchaseRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut all: Vec<PurchaseRequest> = requests.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn create(
        &self,
        request: &PurchaseRequest,
        history: &HistoryEntry,
    ) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request.clone());
        self.history.write().await.push(history.clone());
        Ok(())
    }

    async fn apply_transition(
        &self,
        updated: &PurchaseRequest,
        expected_status: RequestStatus,
        history: &HistoryEntry,
    ) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(stored) = requests.get_mut(&updated.id.0) else {
            return Ok(false);
        };
        if stored.status != expected_status {
            return Ok(false);
        }

        // Cart fields are owned by update_cart_outcome; carry them over.
        let mut next = updated.clone();
        next.added_to_cart = stored.added_to_cart;
        next.added_to_cart_at = stored.added_to_cart_at;
        next.cart_error = stored.cart_error.clone();
        *stored = next;

        self.history.write().await.push(history.clone());
        Ok(true)
    }

    async fn update_details(
        &self,
        updated: &PurchaseRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(stored) = requests.get_mut(&updated.id.0) else {
            return Ok(false);
        };
        if stored.status != expected_status {
            return Ok(false);
        }

        let mut next = updated.clone();
        next.added_to_cart = stored.added_to_cart;
        next.added_to_cart_at = stored.added_to_cart_at;
        next.cart_error = stored.cart_error.clone();
        *stored = next;
        Ok(true)
    }

    async fn update_cart_outcome(
        &self,
        id: &RequestId,
        added_to_cart: bool,
        added_to_cart_at: Option<DateTime<Utc>>,
        cart_error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        if let Some(stored) = requests.get_mut(&id.0) {
            stored.added_to_cart = added_to_cart;
            stored.added_to_cart_at = added_to_cart_at;
            stored.cart_error = cart_error.map(str::to_string);
            stored.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_history(&self, id: &RequestId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let history = self.history.read().await;
        let mut entries: Vec<HistoryEntry> =
            history.iter().filter(|entry| entry.request_id == *id).cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    async fn count_created_in_year(&self, year: i32) -> Result<u32, RepositoryError> {
        use chrono::Datelike;

        let requests = self.requests.read().await;
        Ok(requests.values().filter(|request| request.created_at.year() == year).count() as u32)
    }

    async fn status_counts(&self) -> Result<HashMap<RequestStatus, u32>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut counts = HashMap::new();
        for request in requests.values() {
            *counts.entry(request.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    credential: RwLock<Option<AutomationCredential>>,
}

#[async_trait::async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn get(&self) -> Result<Option<AutomationCredential>, RepositoryError> {
        Ok(self.credential.read().await.clone())
    }

    async fn upsert(&self, credential: &AutomationCredential) -> Result<(), RepositoryError> {
        *self.credential.write().await = Some(credential.clone());
        Ok(())
    }

    async fn record_test(
        &self,
        status: &str,
        message: Option<&str>,
        tested_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(credential) = self.credential.write().await.as_mut() {
            credential.last_test_status = Some(status.to_string());
            credential.last_test_message = message.map(str::to_string);
            credential.last_tested_at = Some(tested_at);
            credential.updated_at = tested_at;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCartJobRepository {
    jobs: RwLock<HashMap<String, CartJob>>,
}

#[async_trait::async_trait]
impl CartJobRepository for InMemoryCartJobRepository {
    async fn enqueue(&self, job: &CartJob) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.0.clone(), job.clone());
        Ok(())
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<CartJob>, RepositoryError> {
        let mut jobs = self.jobs.write().await;
        let Some(id) = jobs
            .values()
            .filter(|job| job.state == CartJobState::Queued)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)))
            .map(|job| job.id.0.clone())
        else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).map(|job| {
            job.state = CartJobState::Running;
            job.attempt_count += 1;
            job.updated_at = now;
            job.clone()
        });
        Ok(job)
    }

    async fn mark_completed(
        &self,
        id: &CartJobId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id.0) {
            job.state = CartJobState::Completed;
            job.last_error = None;
            job.updated_at = now;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &CartJobId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id.0) {
            job.state = CartJobState::Failed;
            job.last_error = Some(error.to_string());
            job.updated_at = now;
        }
        Ok(())
    }

    async fn requeue(&self, id: &CartJobId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id.0) {
            if job.state == CartJobState::Failed {
                job.state = CartJobState::Queued;
                job.updated_at = now;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn find_by_id(&self, id: &CartJobId) -> Result<Option<CartJob>, RepositoryError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id.0).cloned())
    }

    async fn latest_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<CartJob>, RepositoryError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| job.request_id == *request_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use procura_core::domain::history::{HistoryAction, HistoryEntry, HistoryEntryId};
    use procura_core::domain::job::{CartJob, CartJobId, CartJobState};
    use procura_core::domain::request::{
        PurchaseRequest, RequestId, RequestStatus, Urgency,
    };

    use crate::repositories::{
        CartJobRepository, InMemoryCartJobRepository, InMemoryRequestRepository,
        RequestRepository,
    };

    fn request(id: &str, status: RequestStatus) -> PurchaseRequest {
        PurchaseRequest {
            id: RequestId(id.to_string()),
            request_number: format!("REQ-{id}"),
            requester_id: "U-100".to_string(),
            product_url: "https://www.amazon.com/dp/B08N5WRWNW".to_string(),
            lines: Vec::new(),
            quantity: 1,
            justification: "test".to_string(),
            urgency: Urgency::Normal,
            currency: "USD".to_string(),
            estimated_price: None,
            status,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            info_requested_at: None,
            info_request_note: None,
            purchased_by: None,
            purchased_at: None,
            purchase_notes: None,
            is_automatable: true,
            asin: None,
            added_to_cart: false,
            added_to_cart_at: None,
            cart_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn history(id: &str, request_id: &str, action: HistoryAction) -> HistoryEntry {
        HistoryEntry {
            id: HistoryEntryId(id.to_string()),
            request_id: RequestId(request_id.to_string()),
            actor_id: "U-100".to_string(),
            action,
            old_status: None,
            new_status: RequestStatus::Pending,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_transition_respects_the_status_guard() {
        let repo = InMemoryRequestRepository::default();
        let pending = request("req-m1", RequestStatus::Pending);
        repo.create(&pending, &history("h1", "req-m1", HistoryAction::Created))
            .await
            .expect("create");

        let mut approved = pending.clone();
        approved.status = RequestStatus::Approved;

        let lost = repo
            .apply_transition(
                &approved,
                RequestStatus::InfoRequested,
                &history("h2", "req-m1", HistoryAction::Approved),
            )
            .await
            .expect("transition");
        assert!(!lost);

        let won = repo
            .apply_transition(
                &approved,
                RequestStatus::Pending,
                &history("h3", "req-m1", HistoryAction::Approved),
            )
            .await
            .expect("transition");
        assert!(won);

        let stored = repo.find_by_id(&pending.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn in_memory_claim_is_oldest_first() {
        let repo = InMemoryCartJobRepository::default();
        let now = Utc::now();
        let older = CartJob::new(
            CartJobId("job-1".to_string()),
            RequestId("req-m2".to_string()),
            "https://www.amazon.com/dp/B08N5WRWNW".to_string(),
            1,
            now - chrono::Duration::minutes(5),
        );
        let newer = CartJob::new(
            CartJobId("job-2".to_string()),
            RequestId("req-m2".to_string()),
            "https://www.amazon.com/dp/B08N5WRWNW".to_string(),
            1,
            now,
        );
        repo.enqueue(&newer).await.expect("enqueue");
        repo.enqueue(&older).await.expect("enqueue");

        let claimed = repo.claim_next(Utc::now()).await.expect("claim").expect("job");
        assert_eq!(claimed.id.0, "job-1");
        assert_eq!(claimed.state, CartJobState::Running);
    }
}
