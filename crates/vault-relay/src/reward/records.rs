use serde::{Deserialize, Serialize};
use vault_types::{CodeHash, EthAddress};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStatus {
    /// Preconditions held and the group is reserved; nothing broadcast yet.
    Reserved,
    Submitted,
    /// Broadcast outcome unknown; the reservation stays in place.
    Unconfirmed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub business_id: String,
    pub referrer: EthAddress,
    pub recipient: EthAddress,
    pub codes: Vec<CodeHash>,
    pub status: RewardStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispenseReceipt {
    pub tx_hash: String,
    pub business_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferrerStats {
    pub address: EthAddress,
    pub count: u64,
}
