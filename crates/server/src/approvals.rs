//! Approval operations: the only path through which request status changes.
//! Each operation evaluates the workflow table, persists the transition under
//! a status guard, and appends exactly one history entry.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use procura_core::domain::history::{HistoryEntry, HistoryEntryId};
use procura_core::domain::job::{CartJob, CartJobId};
use procura_core::domain::request::{
    format_request_number, PurchaseRequest, RequestId, RequestLine, RequestStatus, Urgency,
};
use procura_core::errors::{InterfaceError, WorkflowError};
use procura_core::retailer::{extract_asin, is_amazon_url};
use procura_core::workflow::{self, Actor, WorkflowAction};
use procura_db::repositories::{CartJobRepository, RepositoryError, RequestRepository};

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ApprovalError {
    pub fn into_interface(self, correlation_id: &str) -> InterfaceError {
        match self {
            Self::Workflow(error) => error.into_interface(correlation_id),
            Self::Repository(error) => {
                InterfaceError::internal(error.to_string(), correlation_id)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewRequest {
    pub requester_id: String,
    pub product_url: String,
    pub lines: Vec<RequestLine>,
    pub quantity: u32,
    pub justification: String,
    pub urgency: Urgency,
    pub currency: String,
    pub estimated_price: Option<Decimal>,
}

/// Fields a requester may change while the request is still editable. `None`
/// leaves the stored value alone.
#[derive(Clone, Debug, Default)]
pub struct RequestUpdate {
    pub product_url: Option<String>,
    pub lines: Option<Vec<RequestLine>>,
    pub quantity: Option<u32>,
    pub justification: Option<String>,
    pub urgency: Option<Urgency>,
    pub currency: Option<String>,
    pub estimated_price: Option<Decimal>,
}

pub struct ApprovalService {
    requests: Arc<dyn RequestRepository>,
    jobs: Arc<dyn CartJobRepository>,
    automation_enabled: bool,
}

impl ApprovalService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        jobs: Arc<dyn CartJobRepository>,
        automation_enabled: bool,
    ) -> Self {
        Self { requests, jobs, automation_enabled }
    }

    pub async fn create_request(
        &self,
        input: NewRequest,
    ) -> Result<PurchaseRequest, ApprovalError> {
        if input.requester_id.trim().is_empty() {
            return Err(WorkflowError::Validation("requester id is required".to_string()).into());
        }
        if input.product_url.trim().is_empty() {
            return Err(WorkflowError::Validation("product url is required".to_string()).into());
        }
        if input.justification.trim().is_empty() {
            return Err(WorkflowError::Validation("justification is required".to_string()).into());
        }
        if input.quantity == 0 {
            return Err(
                WorkflowError::Validation("quantity must be at least 1".to_string()).into()
            );
        }

        let now = Utc::now();
        let sequence = self.requests.count_created_in_year(now.year()).await? + 1;
        let request = PurchaseRequest {
            id: RequestId(new_id()),
            request_number: format_request_number(now.year(), sequence),
            requester_id: input.requester_id,
            is_automatable: is_amazon_url(&input.product_url),
            asin: extract_asin(&input.product_url),
            product_url: input.product_url,
            lines: input.lines,
            quantity: input.quantity,
            justification: input.justification,
            urgency: input.urgency,
            currency: input.currency,
            estimated_price: input.estimated_price,
            status: RequestStatus::Pending,
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
            added_to_cart: false,
            added_to_cart_at: None,
            cart_error: None,
            created_at: now,
            updated_at: now,
        };

        let history = HistoryEntry {
            id: HistoryEntryId(new_id()),
            request_id: request.id.clone(),
            actor_id: request.requester_id.clone(),
            action: procura_core::domain::history::HistoryAction::Created,
            old_status: None,
            new_status: RequestStatus::Pending,
            comment: "Purchase request created".to_string(),
            created_at: now,
        };
        self.requests.create(&request, &history).await?;

        tracing::info!(
            event_name = "approvals.request.created",
            request_id = %request.id.0,
            request_number = %request.request_number,
            is_automatable = request.is_automatable,
            "purchase request created"
        );
        Ok(request)
    }

    pub async fn get_request(&self, id: &RequestId) -> Result<PurchaseRequest, ApprovalError> {
        self.load(id).await
    }

    pub async fn list_requests(&self) -> Result<Vec<PurchaseRequest>, ApprovalError> {
        Ok(self.requests.list().await?)
    }

    pub async fn history(
        &self,
        id: &RequestId,
    ) -> Result<Vec<HistoryEntry>, ApprovalError> {
        self.load(id).await?;
        Ok(self.requests.list_history(id).await?)
    }

    /// Approving an automatable request also queues a cart job. The queueing
    /// is best effort; a queue failure is logged but the approval stands.
    pub async fn approve(
        &self,
        id: &RequestId,
        actor: &Actor,
        comment: Option<&str>,
    ) -> Result<PurchaseRequest, ApprovalError> {
        let updated = self.decide(id, actor, WorkflowAction::Approve, comment).await?;

        if self.automation_enabled && updated.is_automatable {
            let job = CartJob::new(
                CartJobId(new_id()),
                updated.id.clone(),
                updated.product_url.clone(),
                updated.quantity,
                Utc::now(),
            );
            match self.jobs.enqueue(&job).await {
                Ok(()) => tracing::info!(
                    event_name = "approvals.cart_job.enqueued",
                    request_id = %updated.id.0,
                    job_id = %job.id.0,
                    "cart automation job enqueued"
                ),
                Err(error) => tracing::error!(
                    event_name = "approvals.cart_job.enqueue_failed",
                    request_id = %updated.id.0,
                    error = %error,
                    "could not enqueue cart automation job"
                ),
            }
        }
        Ok(updated)
    }

    pub async fn reject(
        &self,
        id: &RequestId,
        actor: &Actor,
        reason: &str,
    ) -> Result<PurchaseRequest, ApprovalError> {
        self.decide(id, actor, WorkflowAction::Reject, Some(reason)).await
    }

    pub async fn request_info(
        &self,
        id: &RequestId,
        actor: &Actor,
        note: &str,
    ) -> Result<PurchaseRequest, ApprovalError> {
        self.decide(id, actor, WorkflowAction::RequestInfo, Some(note)).await
    }

    pub async fn cancel(
        &self,
        id: &RequestId,
        actor: &Actor,
        comment: Option<&str>,
    ) -> Result<PurchaseRequest, ApprovalError> {
        self.decide(id, actor, WorkflowAction::Cancel, comment).await
    }

    pub async fn mark_purchased(
        &self,
        id: &RequestId,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<PurchaseRequest, ApprovalError> {
        self.decide(id, actor, WorkflowAction::MarkPurchased, notes).await
    }

    /// Owner edit. In `InfoRequested` the edit doubles as a resubmission and
    /// moves the request back to `Pending`; in `Pending` the fields change
    /// without a transition.
    pub async fn update_request(
        &self,
        id: &RequestId,
        actor: &Actor,
        update: RequestUpdate,
    ) -> Result<PurchaseRequest, ApprovalError> {
        let request = self.load(id).await?;
        if request.requester_id != actor.user_id {
            return Err(WorkflowError::Forbidden {
                actor_id: actor.user_id.clone(),
                action: "update",
            }
            .into());
        }
        if !request.can_be_edited() {
            return Err(WorkflowError::InvalidState {
                status: request.status,
                action: "update",
            }
            .into());
        }
        if let Some(quantity) = update.quantity {
            if quantity == 0 {
                return Err(
                    WorkflowError::Validation("quantity must be at least 1".to_string()).into()
                );
            }
        }
        if let Some(url) = update.product_url.as_deref() {
            if url.trim().is_empty() {
                return Err(
                    WorkflowError::Validation("product url cannot be blank".to_string()).into()
                );
            }
        }

        let now = Utc::now();
        let mut updated = request.clone();
        if let Some(url) = update.product_url {
            updated.is_automatable = is_amazon_url(&url);
            updated.asin = extract_asin(&url);
            updated.product_url = url;
        }
        if let Some(lines) = update.lines {
            updated.lines = lines;
        }
        if let Some(quantity) = update.quantity {
            updated.quantity = quantity;
        }
        if let Some(justification) = update.justification {
            updated.justification = justification;
        }
        if let Some(urgency) = update.urgency {
            updated.urgency = urgency;
        }
        if let Some(currency) = update.currency {
            updated.currency = currency;
        }
        if let Some(price) = update.estimated_price {
            updated.estimated_price = Some(price);
        }
        updated.updated_at = now;

        if request.status == RequestStatus::InfoRequested {
            let outcome = workflow::evaluate(&request, WorkflowAction::Resubmit, actor, None)?;
            updated.status = outcome.to;
            let history = HistoryEntry {
                id: HistoryEntryId(new_id()),
                request_id: updated.id.clone(),
                actor_id: actor.user_id.clone(),
                action: outcome.history_action,
                old_status: Some(outcome.from),
                new_status: outcome.to,
                comment: "Request updated and resubmitted".to_string(),
                created_at: now,
            };
            if !self.requests.apply_transition(&updated, outcome.from, &history).await? {
                return Err(self.conflict(id, "resubmit").await?);
            }
        } else if !self.requests.update_details(&updated, request.status).await? {
            return Err(self.conflict(id, "update").await?);
        }

        Ok(updated)
    }

    /// Re-queues the latest failed cart job for an approved request, or
    /// queues a fresh one when none exists. Decision-maker only.
    pub async fn retry_cart(
        &self,
        id: &RequestId,
        actor: &Actor,
    ) -> Result<CartJob, ApprovalError> {
        if !matches!(
            actor.role,
            procura_core::workflow::ActorRole::Approver | procura_core::workflow::ActorRole::Admin
        ) {
            return Err(WorkflowError::Forbidden {
                actor_id: actor.user_id.clone(),
                action: "retry cart automation for",
            }
            .into());
        }

        let request = self.load(id).await?;
        if request.status != RequestStatus::Approved {
            return Err(WorkflowError::InvalidState {
                status: request.status,
                action: "retry cart automation for",
            }
            .into());
        }
        if !request.is_automatable {
            return Err(WorkflowError::Validation(
                "request is not automatable".to_string(),
            )
            .into());
        }

        let now = Utc::now();
        if let Some(existing) = self.jobs.latest_for_request(id).await? {
            if self.jobs.requeue(&existing.id, now).await? {
                return Ok(CartJob {
                    state: procura_core::domain::job::CartJobState::Queued,
                    updated_at: now,
                    ..existing
                });
            }
        }

        let job = CartJob::new(
            CartJobId(new_id()),
            request.id.clone(),
            request.product_url.clone(),
            request.quantity,
            now,
        );
        self.jobs.enqueue(&job).await?;
        Ok(job)
    }

    pub async fn stats(
        &self,
    ) -> Result<std::collections::HashMap<RequestStatus, u32>, ApprovalError> {
        Ok(self.requests.status_counts().await?)
    }

    async fn load(&self, id: &RequestId) -> Result<PurchaseRequest, ApprovalError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("request {} not found", id.0)).into())
    }

    async fn decide(
        &self,
        id: &RequestId,
        actor: &Actor,
        action: WorkflowAction,
        comment: Option<&str>,
    ) -> Result<PurchaseRequest, ApprovalError> {
        let request = self.load(id).await?;
        let outcome = workflow::evaluate(&request, action, actor, comment)?;

        let now = Utc::now();
        let mut updated = request.clone();
        updated.status = outcome.to;
        updated.updated_at = now;
        match action {
            WorkflowAction::Approve => {
                updated.approved_by = Some(actor.user_id.clone());
                updated.approved_at = Some(now);
            }
            WorkflowAction::Reject => {
                updated.rejected_by = Some(actor.user_id.clone());
                updated.rejected_at = Some(now);
                updated.rejection_reason = comment.map(str::to_string);
            }
            WorkflowAction::RequestInfo => {
                updated.info_requested_at = Some(now);
                updated.info_request_note = comment.map(str::to_string);
            }
            WorkflowAction::MarkPurchased => {
                updated.purchased_by = Some(actor.user_id.clone());
                updated.purchased_at = Some(now);
                updated.purchase_notes = comment.map(str::to_string);
            }
            WorkflowAction::Resubmit | WorkflowAction::Cancel => {}
        }

        let history = HistoryEntry {
            id: HistoryEntryId(new_id()),
            request_id: updated.id.clone(),
            actor_id: actor.user_id.clone(),
            action: outcome.history_action,
            old_status: Some(outcome.from),
            new_status: outcome.to,
            comment: comment.unwrap_or(default_comment(action)).to_string(),
            created_at: now,
        };

        if !self.requests.apply_transition(&updated, outcome.from, &history).await? {
            return Err(self.conflict(id, action.as_str()).await?);
        }

        tracing::info!(
            event_name = "approvals.request.transitioned",
            request_id = %updated.id.0,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            actor_id = %actor.user_id,
            "request status transitioned"
        );
        Ok(updated)
    }

    /// The status guard lost; report against what the row looks like now.
    async fn conflict(
        &self,
        id: &RequestId,
        action: &'static str,
    ) -> Result<ApprovalError, ApprovalError> {
        let current = self.load(id).await?;
        Ok(WorkflowError::InvalidState { status: current.status, action }.into())
    }
}

fn default_comment(action: WorkflowAction) -> &'static str {
    match action {
        WorkflowAction::Approve => "Request approved",
        WorkflowAction::Reject => "Request rejected",
        WorkflowAction::RequestInfo => "More information requested",
        WorkflowAction::Resubmit => "Request updated and resubmitted",
        WorkflowAction::Cancel => "Request cancelled",
        WorkflowAction::MarkPurchased => "Marked as purchased",
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Datelike;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use procura_core::domain::history::HistoryAction;
    use procura_core::domain::job::CartJobState;
    use procura_core::domain::request::{RequestId, RequestLine, RequestStatus, Urgency};
    use procura_core::errors::{InterfaceErrorKind, WorkflowError};
    use procura_core::workflow::{Actor, ActorRole};
    use procura_db::repositories::{
        CartJobRepository, InMemoryCartJobRepository, InMemoryRequestRepository,
    };

    use super::{ApprovalError, ApprovalService, NewRequest, RequestUpdate};

    fn service() -> (ApprovalService, Arc<InMemoryCartJobRepository>) {
        let jobs = Arc::new(InMemoryCartJobRepository::default());
        let requests = Arc::new(InMemoryRequestRepository::default());
        (ApprovalService::new(requests, jobs.clone(), true), jobs)
    }

    fn new_request(requester: &str) -> NewRequest {
        NewRequest {
            requester_id: requester.to_string(),
            product_url: "https://www.amazon.com/dp/B08N5WRWNW".to_string(),
            lines: vec![RequestLine {
                description: "mechanical keyboard".to_string(),
                quantity: 1,
                unit_price: Decimal::new(8999, 2),
            }],
            quantity: 1,
            justification: "keyboard died".to_string(),
            urgency: Urgency::Normal,
            currency: "USD".to_string(),
            estimated_price: Some(Decimal::new(8999, 2)),
        }
    }

    fn requester() -> Actor {
        Actor::new("U-100", ActorRole::Employee)
    }

    fn approver() -> Actor {
        Actor::new("U-approver", ActorRole::Approver)
    }

    fn admin() -> Actor {
        Actor::new("U-admin", ActorRole::Admin)
    }

    #[tokio::test]
    async fn created_requests_are_pending_numbered_and_classified() {
        let (service, _) = service();

        let request = service.create_request(new_request("U-100")).await.expect("create");

        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.request_number, format!("REQ-{}-0001", Utc::now().year()));
        assert!(request.is_automatable);
        assert_eq!(request.asin.as_deref(), Some("B08N5WRWNW"));

        let history = service.history(&request.id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[0].old_status, None);

        let second = service.create_request(new_request("U-100")).await.expect("create second");
        assert_eq!(second.request_number, format!("REQ-{}-0002", Utc::now().year()));
    }

    #[tokio::test]
    async fn blank_justification_is_rejected_before_any_write() {
        let (service, _) = service();
        let mut input = new_request("U-100");
        input.justification = "   ".to_string();

        let error = service.create_request(input).await.expect_err("must fail");
        assert!(matches!(error, ApprovalError::Workflow(WorkflowError::Validation(_))));
        assert!(service.list_requests().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn approve_sets_metadata_and_enqueues_a_cart_job() {
        let (service, jobs) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");

        let approved =
            service.approve(&request.id, &approver(), None).await.expect("approve");

        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("U-approver"));
        assert!(approved.approved_at.is_some());

        let job = jobs
            .latest_for_request(&request.id)
            .await
            .expect("latest")
            .expect("job enqueued");
        assert_eq!(job.state, CartJobState::Queued);
        assert_eq!(job.product_url, approved.product_url);

        let history = service.history(&request.id).await.expect("history");
        assert_eq!(history.last().map(|entry| entry.action), Some(HistoryAction::Approved));
        assert_eq!(history.last().map(|entry| entry.comment.as_str()), Some("Request approved"));
    }

    #[tokio::test]
    async fn approve_with_automation_disabled_enqueues_nothing() {
        let jobs = Arc::new(InMemoryCartJobRepository::default());
        let requests = Arc::new(InMemoryRequestRepository::default());
        let service = ApprovalService::new(requests, jobs.clone(), false);

        let request = service.create_request(new_request("U-100")).await.expect("create");
        service.approve(&request.id, &approver(), None).await.expect("approve");

        assert!(jobs.latest_for_request(&request.id).await.expect("latest").is_none());
    }

    #[tokio::test]
    async fn approving_a_non_automatable_request_enqueues_nothing() {
        let (service, jobs) = service();
        let mut input = new_request("U-100");
        input.product_url = "https://www.example.com/widget".to_string();

        let request = service.create_request(input).await.expect("create");
        assert!(!request.is_automatable);

        let approved = service.approve(&request.id, &approver(), None).await.expect("approve");
        assert_eq!(approved.status, RequestStatus::Approved);
        assert!(jobs.latest_for_request(&request.id).await.expect("latest").is_none());
    }

    #[tokio::test]
    async fn operation_errors_carry_their_interface_class_and_correlation_id() {
        let (service, _) = service();

        let missing = service
            .approve(&RequestId("req-missing".to_string()), &approver(), None)
            .await
            .expect_err("unknown id");
        let interface = missing.into_interface("corr-42");
        assert_eq!(interface.kind, InterfaceErrorKind::NotFound);
        assert_eq!(interface.correlation_id, "corr-42");

        let request = service.create_request(new_request("U-100")).await.expect("create");
        let forbidden = service
            .approve(&request.id, &requester(), None)
            .await
            .expect_err("employee cannot approve");
        assert_eq!(forbidden.into_interface("corr-43").kind, InterfaceErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn employees_cannot_approve_and_approvals_do_not_repeat() {
        let (service, _) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");

        let forbidden =
            service.approve(&request.id, &requester(), None).await.expect_err("employee");
        assert!(matches!(forbidden, ApprovalError::Workflow(WorkflowError::Forbidden { .. })));

        service.approve(&request.id, &approver(), None).await.expect("first approve");
        let repeated =
            service.approve(&request.id, &approver(), None).await.expect_err("second approve");
        assert!(matches!(
            repeated,
            ApprovalError::Workflow(WorkflowError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn reject_requires_a_reason_and_records_it() {
        let (service, _) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");

        let error = service.reject(&request.id, &approver(), "  ").await.expect_err("blank");
        assert!(matches!(error, ApprovalError::Workflow(WorkflowError::Validation(_))));

        let rejected = service
            .reject(&request.id, &approver(), "budget exhausted this quarter")
            .await
            .expect("reject");
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("budget exhausted this quarter"));
    }

    #[tokio::test]
    async fn info_request_and_owner_resubmit_round_trip() {
        let (service, _) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");

        let waiting = service
            .request_info(&request.id, &approver(), "which model exactly?")
            .await
            .expect("request info");
        assert_eq!(waiting.status, RequestStatus::InfoRequested);
        assert_eq!(waiting.info_request_note.as_deref(), Some("which model exactly?"));

        let stranger = Actor::new("U-999", ActorRole::Employee);
        let forbidden = service
            .update_request(&request.id, &stranger, RequestUpdate::default())
            .await
            .expect_err("not the owner");
        assert!(matches!(forbidden, ApprovalError::Workflow(WorkflowError::Forbidden { .. })));

        let resubmitted = service
            .update_request(
                &request.id,
                &requester(),
                RequestUpdate {
                    justification: Some("keyboard died, need the K3 Pro model".to_string()),
                    ..RequestUpdate::default()
                },
            )
            .await
            .expect("resubmit");
        assert_eq!(resubmitted.status, RequestStatus::Pending);

        let history = service.history(&request.id).await.expect("history");
        assert_eq!(
            history.iter().map(|entry| entry.action).collect::<Vec<_>>(),
            vec![HistoryAction::Created, HistoryAction::InfoRequested, HistoryAction::Resubmitted]
        );
    }

    #[tokio::test]
    async fn pending_edits_change_fields_without_a_transition() {
        let (service, _) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");

        let edited = service
            .update_request(
                &request.id,
                &requester(),
                RequestUpdate { quantity: Some(2), ..RequestUpdate::default() },
            )
            .await
            .expect("edit");
        assert_eq!(edited.status, RequestStatus::Pending);
        assert_eq!(edited.quantity, 2);

        let history = service.history(&request.id).await.expect("history");
        assert_eq!(history.len(), 1, "a pending edit is not a transition");
    }

    #[tokio::test]
    async fn editing_the_url_reclassifies_automatability() {
        let (service, _) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");
        assert!(request.is_automatable);

        let edited = service
            .update_request(
                &request.id,
                &requester(),
                RequestUpdate {
                    product_url: Some("https://www.example.com/widget".to_string()),
                    ..RequestUpdate::default()
                },
            )
            .await
            .expect("edit");
        assert!(!edited.is_automatable);
        assert_eq!(edited.asin, None);
    }

    #[tokio::test]
    async fn purchased_requests_refuse_cancellation() {
        let (service, _) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");
        service.approve(&request.id, &approver(), None).await.expect("approve");
        service
            .mark_purchased(&request.id, &admin(), Some("ordered on corporate card"))
            .await
            .expect("purchase");

        let error = service
            .cancel(&request.id, &requester(), None)
            .await
            .expect_err("terminal status");
        assert!(matches!(
            error,
            ApprovalError::Workflow(WorkflowError::InvalidState {
                status: RequestStatus::Purchased,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn only_admins_mark_requests_purchased() {
        let (service, _) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");
        service.approve(&request.id, &approver(), None).await.expect("approve");

        let error = service
            .mark_purchased(&request.id, &approver(), None)
            .await
            .expect_err("approver is not enough");
        assert!(matches!(error, ApprovalError::Workflow(WorkflowError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn retry_requeues_the_failed_job() {
        let (service, jobs) = service();
        let request = service.create_request(new_request("U-100")).await.expect("create");
        service.approve(&request.id, &approver(), None).await.expect("approve");

        let job = jobs.claim_next(Utc::now()).await.expect("claim").expect("job");
        jobs.mark_failed(&job.id, "element not found", Utc::now()).await.expect("fail");

        let retried = service.retry_cart(&request.id, &admin()).await.expect("retry");
        assert_eq!(retried.id, job.id);
        assert_eq!(retried.state, CartJobState::Queued);

        let forbidden = service.retry_cart(&request.id, &requester()).await.expect_err("role");
        assert!(matches!(forbidden, ApprovalError::Workflow(WorkflowError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn stats_count_requests_by_status() {
        let (service, _) = service();
        let first = service.create_request(new_request("U-100")).await.expect("create");
        service.create_request(new_request("U-101")).await.expect("create");
        service.approve(&first.id, &approver(), None).await.expect("approve");

        let stats = service.stats().await.expect("stats");
        assert_eq!(stats.get(&RequestStatus::Pending), Some(&1));
        assert_eq!(stats.get(&RequestStatus::Approved), Some(&1));
    }

    #[tokio::test]
    async fn missing_requests_surface_not_found() {
        let (service, _) = service();
        let error = service
            .get_request(&procura_core::domain::request::RequestId("nope".to_string()))
            .await
            .expect_err("missing");
        assert!(matches!(error, ApprovalError::Workflow(WorkflowError::NotFound(_))));
    }
}
