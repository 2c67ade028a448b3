use super::identity::{IdentityStatus, NonceSlot, SigningIdentity};
use crate::config::RelayerConfig;
use crate::ledger::{hash_hex, LedgerClient, LedgerError, SignedTx};
use crate::metrics::RelayMetrics;
use crate::shutdown::CancellationToken;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vault_types::{VaultError, VaultResult};

const GWEI: u64 = 1_000_000_000;

/// A broadcast accepted by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub tx_hash: H256,
    pub relayer: Address,
    pub nonce: U256,
}

enum Attempt {
    /// The identity failed before anything could have landed; try the next one.
    Retry(VaultError),
    /// Stop: either the call itself was rejected or the outcome is ambiguous.
    Stop(VaultError),
}

/// Round-robin pool of signing identities. Each identity serializes its own
/// submissions behind its lock; different identities submit in parallel.
pub struct RelayerPool {
    identities: Vec<Arc<SigningIdentity>>,
    ledger: Arc<dyn LedgerClient>,
    cursor: AtomicUsize,
    chain_id: u64,
    min_balance: Option<U256>,
    metrics: Arc<RelayMetrics>,
}

impl RelayerPool {
    pub fn new(
        identities: Vec<SigningIdentity>,
        ledger: Arc<dyn LedgerClient>,
        chain_id: u64,
        min_balance: Option<U256>,
        metrics: Arc<RelayMetrics>,
    ) -> VaultResult<Self> {
        if identities.is_empty() {
            return Err(VaultError::Config("No signing identities configured".into()));
        }

        let mut seen = HashSet::new();
        for identity in &identities {
            if !seen.insert(identity.address()) {
                return Err(VaultError::Config(format!(
                    "Duplicate relayer identity {:?}",
                    identity.address()
                )));
            }
        }

        Ok(Self {
            identities: identities.into_iter().map(Arc::new).collect(),
            ledger,
            cursor: AtomicUsize::new(0),
            chain_id,
            min_balance,
            metrics,
        })
    }

    pub fn from_config(
        config: &RelayerConfig,
        chain_id: u64,
        ledger: Arc<dyn LedgerClient>,
        metrics: Arc<RelayMetrics>,
    ) -> VaultResult<Self> {
        let identities = config
            .private_keys
            .iter()
            .map(|key| SigningIdentity::from_key(key, chain_id))
            .collect::<VaultResult<Vec<_>>>()?;

        let floor = config
            .min_balance_gwei
            .map(|gwei| U256::from(gwei) * U256::from(GWEI));

        Self::new(identities, ledger, chain_id, floor, metrics)
    }

    /// Seeds every identity's nonce and balance from the ledger. Identities
    /// that cannot be seeded stay flagged and resync on first use.
    pub async fn initialize(&self) {
        for identity in &self.identities {
            let mut slot = identity.slot.lock().await;
            match self.resync(identity, &mut slot).await {
                Ok(()) => info!("Relayer {:?} ready (nonce {})", identity.address(), slot.nonce),
                Err(e) => warn!("Relayer {:?} nonce seed failed: {}", identity.address(), e),
            }
        }
        self.refresh_balances().await;
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn ledger(&self) -> Arc<dyn LedgerClient> {
        self.ledger.clone()
    }

    pub fn status(&self) -> Vec<IdentityStatus> {
        self.identities.iter().map(|i| i.status()).collect()
    }

    /// Signs and broadcasts one call. Identity-level failures move on to the
    /// next identity, at most once per identity.
    pub async fn submit(&self, target: Address, data: Bytes, gas_limit: U256) -> VaultResult<Submission> {
        let count = self.identities.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let mut attempted = 0usize;
        let mut last_error = None;

        for offset in 0..count {
            let identity = &self.identities[start.wrapping_add(offset) % count];
            if !identity.is_funded(self.min_balance) {
                debug!("Skipping relayer {:?}: balance below floor", identity.address());
                continue;
            }
            attempted += 1;

            match self.attempt(identity, target, &data, gas_limit).await {
                Ok(submission) => {
                    identity.record_success();
                    RelayMetrics::incr(&self.metrics.submissions);
                    info!(
                        "Submitted {} to {:?} from relayer {:?} (nonce {})",
                        hash_hex(&submission.tx_hash),
                        target,
                        submission.relayer,
                        submission.nonce
                    );
                    return Ok(submission);
                }
                Err(Attempt::Retry(e)) => {
                    identity.record_failure();
                    warn!("Relayer {:?} failed, trying next: {}", identity.address(), e);
                    last_error = Some(e);
                }
                Err(Attempt::Stop(e)) => {
                    identity.record_failure();
                    if e.tx_hash().is_some() {
                        RelayMetrics::incr(&self.metrics.unconfirmed_submissions);
                    } else {
                        RelayMetrics::incr(&self.metrics.submission_failures);
                    }
                    warn!("Submission via {:?} stopped: {}", identity.address(), e);
                    return Err(e);
                }
            }
        }

        RelayMetrics::incr(&self.metrics.submission_failures);
        match last_error {
            Some(e) => {
                warn!("All {} eligible relayers failed", attempted);
                Err(e)
            }
            None => Err(VaultError::NoFundedRelayer(format!(
                "all {} relayers are below the balance floor",
                count
            ))),
        }
    }

    async fn attempt(
        &self,
        identity: &SigningIdentity,
        target: Address,
        data: &Bytes,
        gas_limit: U256,
    ) -> Result<Submission, Attempt> {
        let mut slot = identity.slot.lock().await;

        if slot.needs_resync {
            self.resync(identity, &mut slot).await.map_err(Attempt::Retry)?;
        }

        let fee = self
            .ledger
            .fee_price()
            .await
            .map_err(|e| Attempt::Retry(e.into()))?;
        let nonce = slot.nonce;

        let request = TransactionRequest::new()
            .from(identity.address())
            .to(target)
            .data(data.clone())
            .gas(gas_limit)
            .gas_price(fee)
            .nonce(nonce)
            .chain_id(self.chain_id);
        let typed: TypedTransaction = request.into();

        let signature = identity.wallet.sign_transaction_sync(&typed).map_err(|e| {
            Attempt::Stop(VaultError::Internal(format!("Failed to sign transaction: {}", e)))
        })?;
        let raw = typed.rlp_signed(&signature);
        let signed = SignedTx {
            hash: H256::from(keccak256(&raw)),
            raw,
            from: identity.address(),
            nonce,
        };

        match self.ledger.send_transaction(&signed).await {
            Ok(_) | Err(LedgerError::AlreadyKnown) => {
                slot.nonce = nonce + 1;
                Ok(Submission {
                    tx_hash: signed.hash,
                    relayer: identity.address(),
                    nonce,
                })
            }
            Err(LedgerError::NonceConflict(m)) => {
                warn!("Nonce conflict on relayer {:?} at nonce {}: {}", identity.address(), nonce, m);
                if let Err(e) = self.resync(identity, &mut slot).await {
                    warn!("Nonce resync for {:?} failed: {}", identity.address(), e);
                }
                Err(Attempt::Retry(VaultError::NonceConflict(m)))
            }
            Err(LedgerError::InsufficientFunds(m)) => {
                Err(Attempt::Retry(VaultError::InsufficientGas(m)))
            }
            Err(LedgerError::Unreachable(m)) => {
                slot.needs_resync = true;
                Err(Attempt::Retry(VaultError::LedgerUnavailable(m)))
            }
            Err(LedgerError::Timeout(m)) | Err(LedgerError::Malformed(m)) => {
                slot.needs_resync = true;
                Err(Attempt::Stop(VaultError::SubmissionUnconfirmed {
                    tx_hash: hash_hex(&signed.hash),
                    message: m,
                }))
            }
            Err(LedgerError::Rejected(m)) => Err(Attempt::Stop(VaultError::Reverted(m))),
        }
    }

    async fn resync(&self, identity: &SigningIdentity, slot: &mut NonceSlot) -> VaultResult<()> {
        match self.ledger.pending_nonce(identity.address()).await {
            Ok(nonce) => {
                if nonce != slot.nonce {
                    debug!("Relayer {:?} nonce {} -> {}", identity.address(), slot.nonce, nonce);
                }
                slot.nonce = nonce;
                slot.needs_resync = false;
                RelayMetrics::incr(&self.metrics.nonce_resyncs);
                Ok(())
            }
            Err(e) => {
                slot.needs_resync = true;
                Err(e.into())
            }
        }
    }

    /// Re-reads every identity's balance. Returns how many were refreshed.
    pub async fn refresh_balances(&self) -> usize {
        let mut refreshed = 0;
        for identity in &self.identities {
            match self.ledger.balance(identity.address()).await {
                Ok(wei) => {
                    identity.set_balance(wei);
                    refreshed += 1;
                    if !identity.is_funded(self.min_balance) {
                        warn!("Relayer {:?} below balance floor ({} wei)", identity.address(), wei);
                    }
                }
                Err(e) => warn!("Balance refresh for {:?} failed: {}", identity.address(), e),
            }
        }
        refreshed
    }

    pub async fn run_balance_refresh(self: Arc<Self>, every: Duration, mut cancel: CancellationToken) {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.refresh_balances().await;
                }
            }
        }
        debug!("Balance refresh stopped");
    }
}
