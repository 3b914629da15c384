use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordStatus {
    Active,
    /// Set only by the external revocation process
    Revoked,
}

/// One successful redemption of a code on a machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub id: String,
    pub activation_code_id: String,
    pub code: String,
    pub machine_id: String,
    pub activated_at: i64,
    pub status: RecordStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Opaque caller payload, stored as-is
    pub activation_data: serde_json::Value,
}

impl ActivationRecord {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}
