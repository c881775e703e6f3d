use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartJobId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartJobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl CartJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One queued add-to-cart attempt. Approval enqueues; the worker claims the
/// oldest queued row and records the outcome here and on the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartJob {
    pub id: CartJobId,
    pub request_id: RequestId,
    pub product_url: String,
    pub quantity: u32,
    pub state: CartJobState,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartJob {
    pub fn new(
        id: CartJobId,
        request_id: RequestId,
        product_url: String,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request_id,
            product_url,
            quantity,
            state: CartJobState::Queued,
            attempt_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
