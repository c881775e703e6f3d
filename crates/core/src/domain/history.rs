use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{RequestId, RequestStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Approved,
    Rejected,
    InfoRequested,
    Resubmitted,
    Cancelled,
    Purchased,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InfoRequested => "info_requested",
            Self::Resubmitted => "resubmitted",
            Self::Cancelled => "cancelled",
            Self::Purchased => "purchased",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "info_requested" => Some(Self::InfoRequested),
            "resubmitted" => Some(Self::Resubmitted),
            "cancelled" => Some(Self::Cancelled),
            "purchased" => Some(Self::Purchased),
            _ => None,
        }
    }
}

/// Append-only record of one accepted workflow step. `old_status` is None
/// only for the creation entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub request_id: RequestId,
    pub actor_id: String,
    pub action: HistoryAction,
    pub old_status: Option<RequestStatus>,
    pub new_status: RequestStatus,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}
