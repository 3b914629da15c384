use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CodeStatus {
    Unused,
    Used,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationCode {
    pub id: String,
    pub code: String,
    pub status: CodeStatus,
    pub max_activations: i64,
    pub current_activations: i64,
    /// Unix timestamp after which the code can no longer be redeemed
    pub expire_date: i64,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: i64,
}

impl ActivationCode {
    /// Slots left before the code is exhausted.
    pub fn remaining_activations(&self) -> i64 {
        (self.max_activations - self.current_activations).max(0)
    }
}

/// Input for importing a code issued out-of-band.
#[derive(Debug, Clone, Deserialize)]
pub struct NewActivationCode {
    pub code: String,
    pub max_activations: i64,
    pub expire_date: i64,
    pub version: String,
    #[serde(default)]
    pub notes: Option<String>,
}
