use crate::ledger::{address_from_topic, from_address, hash_hex, parse_hash, transfer_topic, LedgerClient};
use crate::store::{decode_record, encode_record, keys, Guard, Op, StateStore, Txn, TxnOutcome};
use ethers::types::{TransactionReceipt, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use vault_types::{EthAddress, VaultResult};

const PROCESSED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxState {
    Pending,
    Failed,
    Success,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintedToken {
    pub reader: EthAddress,
    pub token_id: String,
    pub contract: EthAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStatus {
    pub status: TxState,
    pub tx_hash: String,
    #[serde(flatten)]
    pub minted: Option<MintedToken>,
    pub cached: bool,
}

/// Stored per reader under `vault:reader:{address}:nfts`, one field per token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ReaderNft {
    pub token_id: String,
    pub contract: EthAddress,
    pub tx_hash: String,
    pub block: Option<u64>,
    pub minted_at: i64,
}

pub struct TxTracker {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn StateStore>,
}

impl TxTracker {
    pub fn new(ledger: Arc<dyn LedgerClient>, store: Arc<dyn StateStore>) -> Self {
        Self { ledger, store }
    }

    pub async fn status(&self, raw_hash: &str) -> VaultResult<TxStatus> {
        let hash = parse_hash(raw_hash)?;
        let tx_hash = hash_hex(&hash);

        if let Some(minted) = self.cached(&tx_hash).await? {
            return Ok(TxStatus {
                status: TxState::Success,
                tx_hash,
                minted: Some(minted),
                cached: true,
            });
        }

        let receipt = match self.ledger.receipt(hash).await? {
            Some(receipt) => receipt,
            None => return Ok(Self::bare(TxState::Pending, tx_hash)),
        };
        if receipt.status.map(|s| s.as_u64()) == Some(0) {
            return Ok(Self::bare(TxState::Failed, tx_hash));
        }

        let minted = match mint_in(&receipt) {
            Some(minted) => minted,
            None => {
                debug!("Transaction {} succeeded without a mint log", tx_hash);
                return Ok(Self::bare(TxState::Success, tx_hash));
            }
        };

        let cached = !self.record_once(&tx_hash, &minted).await?;
        Ok(TxStatus {
            status: TxState::Success,
            tx_hash,
            minted: Some(minted),
            cached,
        })
    }

    fn bare(status: TxState, tx_hash: String) -> TxStatus {
        TxStatus {
            status,
            tx_hash,
            minted: None,
            cached: false,
        }
    }

    async fn cached(&self, tx_hash: &str) -> VaultResult<Option<MintedToken>> {
        let key = keys::tx_result(tx_hash);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(decode_record(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// Writes the reader's token record under a one-day processed marker.
    /// Returns false when another lookup already recorded it.
    async fn record_once(&self, tx_hash: &str, minted: &MintedToken) -> VaultResult<bool> {
        let nft = ReaderNft {
            token_id: minted.token_id.clone(),
            contract: minted.contract,
            tx_hash: tx_hash.to_string(),
            block: minted.block,
            minted_at: chrono::Utc::now().timestamp(),
        };

        let txn = Txn::new()
            .guard(Guard::key_absent(keys::tx_processed(tx_hash)))
            .op(Op::set(keys::tx_processed(tx_hash), "1", Some(PROCESSED_TTL)))
            .op(Op::set(keys::tx_result(tx_hash), encode_record(minted)?, Some(PROCESSED_TTL)))
            .op(Op::hset(
                keys::reader_nfts(&minted.reader),
                format!("{}:{}", minted.contract, minted.token_id),
                encode_record(&nft)?,
            ));

        match self.store.commit(txn).await? {
            TxnOutcome::Committed => {
                info!(
                    "Recorded token {} of {} for reader {}",
                    minted.token_id, minted.contract, minted.reader
                );
                Ok(true)
            }
            TxnOutcome::GuardFailed(_) => Ok(false),
        }
    }
}

/// First ERC-721 mint `Transfer` in the receipt.
fn mint_in(receipt: &TransactionReceipt) -> Option<MintedToken> {
    let topic = transfer_topic();
    receipt
        .logs
        .iter()
        .filter(|log| log.topics.len() == 4 && log.topics[0] == topic)
        .find(|log| address_from_topic(&log.topics[1]).is_zero())
        .map(|log| MintedToken {
            reader: from_address(address_from_topic(&log.topics[2])),
            token_id: U256::from_big_endian(log.topics[3].as_bytes()).to_string(),
            contract: from_address(log.address),
            block: receipt.block_number.map(|b| b.as_u64()),
        })
}
