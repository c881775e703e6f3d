use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    InfoRequested,
    Purchased,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InfoRequested => "info_requested",
            Self::Purchased => "purchased",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "info_requested" => Some(Self::InfoRequested),
            "purchased" => Some(Self::Purchased),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Purchased | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Urgent,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl RequestLine {
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: RequestId,
    pub request_number: String,
    pub requester_id: String,
    pub product_url: String,
    pub lines: Vec<RequestLine>,
    pub quantity: u32,
    pub justification: String,
    pub urgency: Urgency,
    pub currency: String,
    pub estimated_price: Option<Decimal>,
    pub status: RequestStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub info_requested_at: Option<DateTime<Utc>>,
    pub info_request_note: Option<String>,
    pub purchased_by: Option<String>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub purchase_notes: Option<String>,
    pub is_automatable: bool,
    pub asin: Option<String>,
    pub added_to_cart: bool,
    pub added_to_cart_at: Option<DateTime<Utc>>,
    pub cart_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    /// Sum of itemized lines, or the estimated price when no lines were given.
    pub fn total(&self) -> Option<Decimal> {
        if self.lines.is_empty() {
            return self.estimated_price;
        }
        Some(self.lines.iter().map(RequestLine::total).sum())
    }

    pub fn can_be_approved(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn can_be_rejected(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn can_be_edited(&self) -> bool {
        matches!(self.status, RequestStatus::Pending | RequestStatus::InfoRequested)
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(self.status, RequestStatus::Pending | RequestStatus::InfoRequested)
    }

    pub fn can_be_purchased(&self) -> bool {
        self.status == RequestStatus::Approved
    }
}

/// Human-facing number shown alongside the opaque row id, e.g. `REQ-2026-0042`.
pub fn format_request_number(year: i32, sequence: u32) -> String {
    format!("REQ-{year}-{sequence:04}")
}
