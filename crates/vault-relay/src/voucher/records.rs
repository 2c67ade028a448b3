//! Structured records persisted for vouchers. One field name per concept.

use serde::{Deserialize, Serialize};
use vault_types::{CodeHash, EthAddress, Role};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    /// Written after a relayed mint for this code.
    Redeemed,
    /// Reader account generated on first lookup.
    Generated,
    /// Legacy used code bound to the account that presented it.
    SelfHealed,
}

/// Durable code → account association. Written once, never replaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub address: EthAddress,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<EthAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub source: BindingSource,
    pub bound_at: i64,
}

/// Per-transaction mint record, kept for a limited time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    pub code: CodeHash,
    pub book: EthAddress,
    pub reader: EthAddress,
    pub relayer: EthAddress,
    pub tx_hash: String,
    pub submitted_at: i64,
}

/// A redemption whose broadcast may or may not have reached the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRedemption {
    pub code: CodeHash,
    pub recipient: EthAddress,
    pub book: EthAddress,
    pub tx_hash: String,
    pub submitted_at: i64,
}

/// Successful redemption as returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub code: CodeHash,
    pub recipient: EthAddress,
    pub book: EthAddress,
    pub relayer: EthAddress,
    pub tx_hash: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyStatus {
    AdminAccess,
    AlreadyOwned,
    Valid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub status: VerifyStatus,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<EthAddress>,
}

/// Public view of a binding. Carries no key material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BindingView {
    pub code: CodeHash,
    pub role: Role,
    pub address: EthAddress,
    pub book_address: Option<EthAddress>,
    pub generated: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SavedCode {
    pub code: CodeHash,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailySales {
    pub date: String,
    /// Cumulative mints up to and including `date`.
    pub sales: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub finalized: usize,
    pub restored: usize,
    pub pending: usize,
    pub errors: usize,
}

/// Raw code handed to the caller at issuance; only its hash is stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssuedCode {
    pub raw: String,
    pub hash: CodeHash,
}
