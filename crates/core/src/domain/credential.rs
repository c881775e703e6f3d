use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace login used by the cart worker. The password is stored only in
/// its encrypted form; `is_configured` is answerable without decrypting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationCredential {
    pub email: String,
    pub encrypted_password: String,
    pub marketplace: String,
    pub is_active: bool,
    pub last_test_status: Option<String>,
    pub last_test_message: Option<String>,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationCredential {
    pub fn is_configured(&self) -> bool {
        !self.email.trim().is_empty() && !self.encrypted_password.trim().is_empty()
    }

    pub fn can_connect(&self) -> bool {
        self.is_configured() && self.is_active
    }
}
