use super::stats::read_u64;
use crate::config::IndexerConfig;
use crate::ledger::{address_from_topic, from_address, hash_hex, to_address, transfer_topic, LedgerClient};
use crate::metrics::RelayMetrics;
use crate::shutdown::CancellationToken;
use crate::store::{keys::NftStatsKeys, Op, StateStore, Txn};
use ethers::types::Log;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vault_types::{EthAddress, VaultError, VaultResult};

/// Result of one scan pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Inclusive block range scanned, `None` when already caught up.
    pub range: Option<(u64, u64)>,
    pub mints_seen: usize,
}

#[derive(Default)]
struct PassState {
    minters: BTreeSet<String>,
    real_users: BTreeSet<String>,
    events: BTreeSet<String>,
}

pub struct ContractIndexer {
    contract: EthAddress,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn StateStore>,
    keys: NftStatsKeys,
    start_block: u64,
    chunk_size: u64,
    interval: Duration,
    reserved: HashSet<EthAddress>,
    metrics: Arc<RelayMetrics>,
}

impl ContractIndexer {
    pub fn new(
        contract: EthAddress,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn StateStore>,
        config: &IndexerConfig,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            keys: NftStatsKeys::new(&contract),
            start_block: config.start_block_for(&contract),
            chunk_size: config.chunk_size.max(1),
            interval: config.interval(),
            reserved: config.reserved_addresses.iter().copied().collect(),
            contract,
            ledger,
            store,
            metrics,
        }
    }

    /// Scans from the checkpoint to the current head. A failed chunk aborts
    /// the pass and leaves the checkpoint where it was.
    pub async fn run_once(&self) -> VaultResult<ScanOutcome> {
        match self.scan().await {
            Ok(outcome) => {
                RelayMetrics::incr(&self.metrics.scans_completed);
                Ok(outcome)
            }
            Err(e) => {
                RelayMetrics::incr(&self.metrics.scans_failed);
                Err(e)
            }
        }
    }

    async fn scan(&self) -> VaultResult<ScanOutcome> {
        let from = match read_u64(self.store.as_ref(), &self.keys.last_block).await? {
            Some(last) => last.saturating_add(1),
            None => self.start_block,
        };
        let head = self.ledger.block_height().await?;
        if head < from {
            return Ok(ScanOutcome {
                range: None,
                mints_seen: 0,
            });
        }

        let contract = to_address(&self.contract);
        let topic = transfer_topic();
        let mut pass = PassState::default();

        let mut chunk_start = from;
        loop {
            let chunk_end = chunk_start.saturating_add(self.chunk_size - 1).min(head);
            let logs = self
                .ledger
                .filter_logs(contract, topic, chunk_start, chunk_end)
                .await
                .map_err(|e| {
                    warn!(
                        "Scan of {} aborted at blocks {}-{}: {}",
                        self.contract, chunk_start, chunk_end, e
                    );
                    VaultError::from(e)
                })?;

            for log in &logs {
                self.classify(log, &mut pass);
            }
            debug!(
                "Scanned {} blocks {}-{}: {} logs",
                self.contract,
                chunk_start,
                chunk_end,
                logs.len()
            );

            if chunk_end >= head {
                break;
            }
            chunk_start = chunk_end + 1;
        }

        let mints_seen = pass.events.len();
        self.commit_pass(pass, head).await?;

        if mints_seen > 0 {
            info!(
                "Indexed {} mint events for {} up to block {}",
                mints_seen, self.contract, head
            );
        }
        Ok(ScanOutcome {
            range: Some((from, head)),
            mints_seen,
        })
    }

    fn classify(&self, log: &Log, pass: &mut PassState) {
        if log.topics.len() < 3 {
            return;
        }
        if !address_from_topic(&log.topics[1]).is_zero() {
            return;
        }
        let (tx_hash, log_index) = match (log.transaction_hash, log.log_index) {
            (Some(hash), Some(index)) => (hash, index),
            _ => {
                warn!("Skipping mint log without transaction position on {}", self.contract);
                return;
            }
        };

        let to = from_address(address_from_topic(&log.topics[2]));
        let member = to.to_hex();
        if !self.reserved.contains(&to) {
            pass.real_users.insert(member.clone());
        }
        pass.minters.insert(member);
        pass.events.insert(format!("{}:{}", hash_hex(&tx_hash), log_index));
    }

    /// Aggregates and checkpoint land in one commit. Event ids dedupe the
    /// minted total, so a re-scanned range adds nothing.
    async fn commit_pass(&self, pass: PassState, head: u64) -> VaultResult<()> {
        let txn = Txn::new()
            .op(Op::SAddAll {
                key: self.keys.minters.clone(),
                members: pass.minters.into_iter().collect(),
                count_into: None,
            })
            .op(Op::SAddAll {
                key: self.keys.real_users.clone(),
                members: pass.real_users.into_iter().collect(),
                count_into: None,
            })
            .op(Op::SAddAll {
                key: self.keys.mint_events.clone(),
                members: pass.events.into_iter().collect(),
                count_into: Some(self.keys.minted_total.clone()),
            })
            .op(Op::set_max(self.keys.last_block.clone(), head));
        self.store.commit(txn).await?;

        let minters = self.store.scard(&self.keys.minters).await?;
        let real_users = self.store.scard(&self.keys.real_users).await?;
        self.store
            .set(&self.keys.unique_minters, &minters.to_string(), None)
            .await?;
        self.store
            .set(&self.keys.unique_real_users, &real_users.to_string(), None)
            .await?;
        Ok(())
    }

    /// Scans on every tick until cancelled. Failures are retried next tick.
    pub async fn run(self, mut cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        info!("Indexer started for {}", self.contract);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!("Indexer pass for {} failed: {}", self.contract, e);
                    }
                }
            }
        }
        debug!("Indexer for {} stopped", self.contract);
    }
}
