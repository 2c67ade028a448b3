//! Ledger client boundary. Every call is bounded by a timeout and failures
//! are classified so the relayer pool can decide whether to retry.

mod calls;
mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use calls::{
    address_from_topic, from_address, hash_hex, parse_hash, to_address, transfer_topic, CallSignature,
};
pub use client::EthersLedger;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Log, TransactionReceipt, H256, U256};
use thiserror::Error;
use vault_types::VaultError;

/// A signed transaction ready for broadcast. The hash is computed locally so
/// it is known even when the broadcast outcome is not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Bytes,
    pub hash: H256,
    pub from: Address,
    pub nonce: U256,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger call timed out: {0}")]
    Timeout(String),

    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    #[error("nonce conflict: {0}")]
    NonceConflict(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The node already holds this exact transaction.
    #[error("transaction already known")]
    AlreadyKnown,

    #[error("rejected by node: {0}")]
    Rejected(String),

    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

impl LedgerError {
    /// Classifies a JSON-RPC error message returned by a node.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("nonce too low")
            || lower.contains("nonce too high")
            || lower.contains("invalid nonce")
            || lower.contains("replacement transaction underpriced")
        {
            LedgerError::NonceConflict(message.to_string())
        } else if lower.contains("insufficient funds") {
            LedgerError::InsufficientFunds(message.to_string())
        } else if lower.contains("already known") || lower.contains("known transaction") {
            LedgerError::AlreadyKnown
        } else {
            LedgerError::Rejected(message.to_string())
        }
    }
}

impl From<LedgerError> for VaultError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Timeout(m) => VaultError::Timeout(m),
            LedgerError::Unreachable(m) => VaultError::LedgerUnavailable(m),
            LedgerError::NonceConflict(m) => VaultError::NonceConflict(m),
            LedgerError::InsufficientFunds(m) => VaultError::InsufficientGas(m),
            LedgerError::AlreadyKnown => VaultError::Internal("transaction already known".into()),
            LedgerError::Rejected(m) => VaultError::Reverted(m),
            LedgerError::Malformed(m) => VaultError::LedgerUnavailable(m),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn chain_id(&self) -> LedgerResult<u64>;

    /// Next nonce including transactions still in the mempool.
    async fn pending_nonce(&self, address: Address) -> LedgerResult<U256>;

    async fn fee_price(&self) -> LedgerResult<U256>;

    async fn balance(&self, address: Address) -> LedgerResult<U256>;

    async fn send_transaction(&self, tx: &SignedTx) -> LedgerResult<H256>;

    async fn receipt(&self, hash: H256) -> LedgerResult<Option<TransactionReceipt>>;

    async fn filter_logs(
        &self,
        contract: Address,
        topic: H256,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<Log>>;

    async fn block_height(&self) -> LedgerResult<u64>;
}
