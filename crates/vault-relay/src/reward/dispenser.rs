use super::business::business_id;
use super::records::{DispenseReceipt, ReferrerStats, RewardRecord, RewardStatus};
use crate::config::{LedgerConfig, RewardConfig};
use crate::ledger::{hash_hex, to_address, CallSignature};
use crate::metrics::RelayMetrics;
use crate::relayer::{RelayerPool, Submission};
use crate::store::{decode_record, encode_record, keys, Guard, Op, StateStore, Txn, TxnOutcome};
use ethers::abi::Token;
use ethers::types::U256;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use vault_types::{CodeHash, EthAddress, VaultError, VaultResult, REWARD_GROUP_SIZE};

/// Index of the first per-code guard in the reservation transaction.
const FIRST_CODE_GUARD: usize = 2;

pub struct RewardDispenser {
    store: Arc<dyn StateStore>,
    pool: Arc<RelayerPool>,
    contract: Option<EthAddress>,
    dispense_call: CallSignature,
    gas_limit: U256,
    books: RewardBooks,
}

/// Settles a committed reservation once the submission outcome is known.
#[derive(Clone)]
struct RewardBooks {
    store: Arc<dyn StateStore>,
    metrics: Arc<RelayMetrics>,
}

impl RewardBooks {
    async fn settle(
        &self,
        mut record: RewardRecord,
        outcome: VaultResult<Submission>,
    ) -> VaultResult<DispenseReceipt> {
        let id_hex = record.business_id.clone();
        match outcome {
            Ok(submission) => {
                let tx_hash = hash_hex(&submission.tx_hash);
                record.status = RewardStatus::Submitted;
                record.tx_hash = Some(tx_hash.clone());

                if let Err(e) = self.record_submitted(&record).await {
                    error!(
                        "Reward {} broadcast as {} but bookkeeping failed: {}",
                        id_hex, tx_hash, e
                    );
                }
                RelayMetrics::incr(&self.metrics.rewards_dispensed);
                info!("Reward {} dispensed to {} (tx {})", id_hex, record.recipient, tx_hash);

                Ok(DispenseReceipt {
                    tx_hash,
                    business_id: id_hex,
                })
            }
            Err(VaultError::SubmissionUnconfirmed { tx_hash, message }) => {
                record.status = RewardStatus::Unconfirmed;
                record.tx_hash = Some(tx_hash.clone());
                match encode_record(&record) {
                    Ok(raw) => {
                        let keep = Txn::new().op(Op::set(keys::reward_business(&id_hex), raw, None));
                        if let Err(e) = self.store.commit(keep).await {
                            error!("Reward {} unconfirmed and not recorded: {}", id_hex, e);
                        }
                    }
                    Err(e) => error!("Reward {} unconfirmed and not encoded: {}", id_hex, e),
                }
                warn!("Reward {} submission {} unconfirmed, reservation kept", id_hex, tx_hash);
                Err(VaultError::SubmissionUnconfirmed { tx_hash, message })
            }
            Err(e) => {
                self.release(&record).await;
                Err(e)
            }
        }
    }

    async fn record_submitted(&self, record: &RewardRecord) -> VaultResult<()> {
        let txn = Txn::new()
            .op(Op::set(
                keys::reward_business(&record.business_id),
                encode_record(record)?,
                None,
            ))
            .op(Op::sadd(
                keys::referrer_rewards(&record.referrer),
                record.business_id.clone(),
            ))
            .op(Op::hincr_by(keys::REFERRER_STATS, record.referrer.to_hex(), 1));
        self.store.commit(txn).await?;
        Ok(())
    }

    /// Undoes a reservation after a definitive submission failure.
    async fn release(&self, record: &RewardRecord) {
        let mut txn = Txn::new()
            .op(Op::del(keys::reward_business(&record.business_id)))
            .op(Op::del(keys::reward_recipient(&record.recipient)));
        for code in &record.codes {
            txn.push(Op::srem(keys::CLAIMED_REWARD_CODES, code.to_hex()));
        }

        match self.store.commit(txn).await {
            Ok(_) => warn!("Released reward reservation {}", record.business_id),
            Err(e) => error!(
                "Reward reservation {} stuck after failed submission: {}",
                record.business_id, e
            ),
        }
    }
}

impl RewardDispenser {
    pub fn new(
        store: Arc<dyn StateStore>,
        pool: Arc<RelayerPool>,
        config: &RewardConfig,
        ledger_config: &LedgerConfig,
        metrics: Arc<RelayMetrics>,
    ) -> VaultResult<Self> {
        Ok(Self {
            dispense_call: CallSignature::parse(&config.dispense_signature)?,
            contract: config.contract,
            gas_limit: U256::from(ledger_config.reward_gas_limit),
            books: RewardBooks {
                store: store.clone(),
                metrics,
            },
            store,
            pool,
        })
    }

    /// Dispenses one reward to `recipient` for a group of five codes.
    ///
    /// Preconditions and the reservation of recipient, business id and codes
    /// are one guarded commit, so two dispenses of the same group cannot both
    /// reach the ledger.
    pub async fn dispense(
        &self,
        referrer: &EthAddress,
        recipient: &EthAddress,
        codes: &[CodeHash],
    ) -> VaultResult<DispenseReceipt> {
        let contract = self
            .contract
            .ok_or_else(|| VaultError::Config("No reward contract configured".into()))?;
        self.validate(recipient, codes).await?;

        let id = business_id(codes);
        let id_hex = hash_hex(&id);
        let mut sorted = codes.to_vec();
        sorted.sort();

        let record = RewardRecord {
            business_id: id_hex.clone(),
            referrer: *referrer,
            recipient: *recipient,
            codes: sorted,
            status: RewardStatus::Reserved,
            tx_hash: None,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.reserve(&record).await?;

        let payload = self.dispense_call.encode(&[
            Token::Address(to_address(recipient)),
            Token::FixedBytes(id.as_bytes().to_vec()),
        ]);

        // The reservation is committed: submission and its settlement run
        // detached so a dropped caller cannot leave it half applied.
        let pool = self.pool.clone();
        let books = self.books.clone();
        let gas = self.gas_limit;
        let task = tokio::spawn(async move {
            let outcome = pool.submit(to_address(&contract), payload, gas).await;
            books.settle(record, outcome).await
        });

        task.await
            .map_err(|e| VaultError::Internal(format!("Reward task for {} failed: {}", id_hex, e)))?
    }

    async fn validate(&self, recipient: &EthAddress, codes: &[CodeHash]) -> VaultResult<()> {
        if codes.len() != REWARD_GROUP_SIZE {
            return Err(VaultError::InvalidInput(format!(
                "Exactly {} codes are required, got {}",
                REWARD_GROUP_SIZE,
                codes.len()
            )));
        }
        let distinct: HashSet<&CodeHash> = codes.iter().collect();
        if distinct.len() != codes.len() {
            return Err(VaultError::InvalidInput("Codes must be distinct".into()));
        }
        if recipient.is_zero() {
            return Err(VaultError::InvalidInput("Recipient must not be the zero account".into()));
        }

        for code in codes {
            let member = code.to_hex();
            let issued = self.store.sismember(keys::VALID_CODES, &member).await?
                || self.store.sismember(keys::USED_CODES, &member).await?;
            if !issued {
                return Err(VaultError::InvalidCode(member));
            }
        }
        Ok(())
    }

    async fn reserve(&self, record: &RewardRecord) -> VaultResult<()> {
        let mut txn = Txn::new()
            .guard(Guard::key_absent(keys::reward_business(&record.business_id)))
            .guard(Guard::key_absent(keys::reward_recipient(&record.recipient)));
        for code in &record.codes {
            txn = txn.guard(Guard::not_member(keys::CLAIMED_REWARD_CODES, code.to_hex()));
        }

        txn.push(Op::set(
            keys::reward_business(&record.business_id),
            encode_record(record)?,
            None,
        ));
        txn.push(Op::set(
            keys::reward_recipient(&record.recipient),
            record.business_id.clone(),
            None,
        ));
        for code in &record.codes {
            txn.push(Op::sadd(keys::CLAIMED_REWARD_CODES, code.to_hex()));
        }

        match self.store.commit(txn).await? {
            TxnOutcome::Committed => Ok(()),
            TxnOutcome::GuardFailed(0) => {
                Err(VaultError::BusinessIdCollision(record.business_id.clone()))
            }
            TxnOutcome::GuardFailed(1) => Err(VaultError::AlreadyRewarded(record.recipient.to_hex())),
            TxnOutcome::GuardFailed(i) => {
                let code = record
                    .codes
                    .get(i - FIRST_CODE_GUARD)
                    .map(|c| c.to_hex())
                    .unwrap_or_default();
                Err(VaultError::CodeAlreadyClaimed(code))
            }
        }
    }

    pub async fn record(&self, business_id: &str) -> VaultResult<Option<RewardRecord>> {
        let key = keys::reward_business(business_id);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(decode_record(&key, &raw)?)),
            None => Ok(None),
        }
    }

    pub async fn referrer_stats(&self, referrer: &EthAddress) -> VaultResult<ReferrerStats> {
        let count = self
            .store
            .hget(keys::REFERRER_STATS, &referrer.to_hex())
            .await?
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(ReferrerStats {
            address: *referrer,
            count,
        })
    }

    /// Every referrer, highest count first.
    pub async fn leaderboard(&self) -> VaultResult<Vec<ReferrerStats>> {
        let mut board: Vec<ReferrerStats> = self
            .store
            .hgetall(keys::REFERRER_STATS)
            .await?
            .into_iter()
            .filter_map(|(address, count)| {
                let address = EthAddress::from_hex(&address).ok()?;
                let count = count.parse::<u64>().ok()?;
                Some(ReferrerStats { address, count })
            })
            .collect();
        board.sort_by(|a, b| b.count.cmp(&a.count).then(a.address.cmp(&b.address)));
        Ok(board)
    }
}
