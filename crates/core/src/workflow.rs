//! Pure transition rules for the purchase-request lifecycle. Evaluation never
//! mutates anything; callers persist the outcome atomically with a history
//! entry.

use serde::{Deserialize, Serialize};

use crate::domain::history::HistoryAction;
use crate::domain::request::{PurchaseRequest, RequestStatus};
use crate::errors::WorkflowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Employee,
    Approver,
    Admin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: ActorRole) -> Self {
        Self { user_id: user_id.into(), role }
    }

    fn can_decide(&self) -> bool {
        matches!(self.role, ActorRole::Approver | ActorRole::Admin)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Approve,
    Reject,
    RequestInfo,
    Resubmit,
    Cancel,
    MarkPurchased,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestInfo => "request info on",
            Self::Resubmit => "resubmit",
            Self::Cancel => "cancel",
            Self::MarkPurchased => "mark purchased",
        }
    }

    fn history_action(&self) -> HistoryAction {
        match self {
            Self::Approve => HistoryAction::Approved,
            Self::Reject => HistoryAction::Rejected,
            Self::RequestInfo => HistoryAction::InfoRequested,
            Self::Resubmit => HistoryAction::Resubmitted,
            Self::Cancel => HistoryAction::Cancelled,
            Self::MarkPurchased => HistoryAction::Purchased,
        }
    }

    fn requires_comment(&self) -> bool {
        matches!(self, Self::Reject | Self::RequestInfo)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub history_action: HistoryAction,
}

/// Decide whether `actor` may apply `action` to `request`, and what status it
/// leads to. Checks run in order: comment validation, authorization, then the
/// transition table.
pub fn evaluate(
    request: &PurchaseRequest,
    action: WorkflowAction,
    actor: &Actor,
    comment: Option<&str>,
) -> Result<TransitionOutcome, WorkflowError> {
    if action.requires_comment() {
        let missing = comment.map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(WorkflowError::Validation(format!(
                "a non-empty comment is required to {}",
                action.as_str()
            )));
        }
    }

    authorize(request, action, actor)?;

    let to = next_status(request.status, action).ok_or(WorkflowError::InvalidState {
        status: request.status,
        action: action.as_str(),
    })?;

    Ok(TransitionOutcome {
        from: request.status,
        to,
        history_action: action.history_action(),
    })
}

fn authorize(
    request: &PurchaseRequest,
    action: WorkflowAction,
    actor: &Actor,
) -> Result<(), WorkflowError> {
    let allowed = match action {
        WorkflowAction::Approve | WorkflowAction::Reject | WorkflowAction::RequestInfo => {
            actor.can_decide()
        }
        WorkflowAction::Resubmit | WorkflowAction::Cancel => {
            actor.user_id == request.requester_id
        }
        WorkflowAction::MarkPurchased => actor.role == ActorRole::Admin,
    };

    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            actor_id: actor.user_id.clone(),
            action: action.as_str(),
        })
    }
}

fn next_status(status: RequestStatus, action: WorkflowAction) -> Option<RequestStatus> {
    match (status, action) {
        (RequestStatus::Pending, WorkflowAction::Approve) => Some(RequestStatus::Approved),
        (RequestStatus::Pending, WorkflowAction::Reject) => Some(RequestStatus::Rejected),
        (RequestStatus::Pending, WorkflowAction::RequestInfo) => {
            Some(RequestStatus::InfoRequested)
        }
        (RequestStatus::InfoRequested, WorkflowAction::Resubmit) => Some(RequestStatus::Pending),
        (RequestStatus::Pending | RequestStatus::InfoRequested, WorkflowAction::Cancel) => {
            Some(RequestStatus::Cancelled)
        }
        (RequestStatus::Approved, WorkflowAction::MarkPurchased) => {
            Some(RequestStatus::Purchased)
        }
        _ => None,
    }
}
