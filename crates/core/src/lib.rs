pub mod config;
pub mod domain;
pub mod errors;
pub mod retailer;
pub mod vault;
pub mod workflow;

pub use domain::credential::AutomationCredential;
pub use domain::history::{HistoryAction, HistoryEntry, HistoryEntryId};
pub use domain::job::{CartJob, CartJobId, CartJobState};
pub use domain::request::{
    PurchaseRequest, RequestId, RequestLine, RequestStatus, Urgency,
};
pub use errors::{InterfaceError, WorkflowError};
pub use retailer::{extract_asin, is_amazon_url};
pub use vault::{CredentialVault, VaultError};
pub use workflow::{Actor, ActorRole, TransitionOutcome, WorkflowAction};
