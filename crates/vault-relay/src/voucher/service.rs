use super::issuance;
use super::records::{
    BindingRecord, BindingSource, BindingView, DailySales, IssuedCode, MintRecord,
    PendingRedemption, ReconcileReport, Redemption, SavedCode, Verification, VerifyStatus,
};
use super::roles::{AccessReport, RoleResolver};
use crate::config::{LedgerConfig, VoucherConfig};
use crate::ledger::{from_address, parse_hash, to_address, CallSignature, LedgerClient};
use crate::metrics::RelayMetrics;
use crate::relayer::{RelayerPool, Submission};
use crate::shutdown::CancellationToken;
use crate::store::{decode_record, encode_record, keys, Guard, Op, StateStore, Txn};
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use vault_types::{CodeClass, CodeHash, EthAddress, Role, VaultError, VaultResult};
use zeroize::Zeroizing;

/// Voucher lifecycle: issuance, redemption through the relayer pool,
/// bindings and reconciliation of ambiguous submissions.
pub struct VoucherService {
    store: Arc<dyn StateStore>,
    pool: Arc<RelayerPool>,
    ledger: Arc<dyn LedgerClient>,
    roles: RoleResolver,
    config: VoucherConfig,
    mint_call: CallSignature,
    mint_gas: U256,
    mint_permits: Arc<Semaphore>,
    books: Bookkeeper,
    metrics: Arc<RelayMetrics>,
}

/// Writes that follow a consumed code: finalize, queue or restore. Owns its
/// handles so it can outlive the request that consumed the code.
#[derive(Clone)]
struct Bookkeeper {
    store: Arc<dyn StateStore>,
    metrics: Arc<RelayMetrics>,
    mint_record_ttl: Duration,
}

impl Bookkeeper {
    async fn settle_submission(
        &self,
        code: CodeHash,
        recipient: EthAddress,
        book: EthAddress,
        outcome: VaultResult<Submission>,
    ) -> VaultResult<Redemption> {
        match outcome {
            Ok(submission) => {
                RelayMetrics::incr(&self.metrics.redemptions_accepted);
                let redemption = Redemption {
                    code,
                    recipient,
                    book,
                    relayer: from_address(submission.relayer),
                    tx_hash: crate::ledger::hash_hex(&submission.tx_hash),
                };
                self.finalize(&redemption).await;
                Ok(redemption)
            }
            Err(VaultError::SubmissionUnconfirmed { tx_hash, message }) => {
                let pending = PendingRedemption {
                    code,
                    recipient,
                    book,
                    tx_hash: tx_hash.clone(),
                    submitted_at: chrono::Utc::now().timestamp(),
                };
                self.record_pending(&pending).await;
                Err(VaultError::SubmissionUnconfirmed { tx_hash, message })
            }
            Err(e) => {
                self.compensate(&code, &e).await;
                Err(e)
            }
        }
    }

    /// Puts a consumed code back to valid after a definitive failure.
    async fn compensate(&self, code: &CodeHash, cause: &VaultError) {
        let member = code.to_hex();
        let restore = Txn::new()
            .guard(Guard::is_member(keys::USED_CODES, &member))
            .op(Op::srem(keys::USED_CODES, &member))
            .op(Op::sadd(keys::VALID_CODES, &member));

        match self.store.commit(restore).await {
            Ok(outcome) if outcome.is_committed() => {
                RelayMetrics::incr(&self.metrics.compensations);
                warn!("Restored code {} after failed submission: {}", code, cause);
            }
            Ok(_) => warn!("Code {} was no longer used when restoring", code),
            Err(e) => error!("Code {} left consumed after failed submission ({}): {}", code, cause, e),
        }
    }

    async fn record_pending(&self, pending: &PendingRedemption) {
        let result = match encode_record(pending) {
            Ok(raw) => {
                self.store
                    .hset(keys::PENDING_REDEMPTIONS, &pending.code.to_hex(), &raw)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => warn!(
                "Submission {} for code {} unconfirmed, queued for reconciliation",
                pending.tx_hash, pending.code
            ),
            Err(e) => error!(
                "Submission {} for code {} unconfirmed and not recorded: {}",
                pending.tx_hash, pending.code, e
            ),
        }
    }

    /// Best-effort bookkeeping after a confirmed broadcast. The code is already
    /// consumed and the transaction exists, so failures here are only logged.
    async fn finalize(&self, redemption: &Redemption) {
        let binding = BindingRecord {
            address: redemption.recipient,
            role: Role::Reader,
            book: Some(redemption.book),
            tx_hash: Some(redemption.tx_hash.clone()),
            source: BindingSource::Redeemed,
            bound_at: chrono::Utc::now().timestamp(),
        };
        match encode_record(&binding) {
            Ok(raw) => {
                if let Err(e) = self.store.set_nx(&keys::binding(&redemption.code), &raw, None).await {
                    error!("Binding for code {} not written: {}", redemption.code, e);
                }
            }
            Err(e) => error!("Binding for code {} not encoded: {}", redemption.code, e),
        }

        let record = MintRecord {
            code: redemption.code,
            book: redemption.book,
            reader: redemption.recipient,
            relayer: redemption.relayer,
            tx_hash: redemption.tx_hash.clone(),
            submitted_at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = self.write_mint_bookkeeping(&record).await {
            error!("Bookkeeping for mint {} failed: {}", redemption.tx_hash, e);
        }

        info!(
            "Mint {} relayed for {} on {}",
            redemption.tx_hash, redemption.recipient, redemption.book
        );
    }

    async fn write_mint_bookkeeping(&self, record: &MintRecord) -> VaultResult<()> {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

        let txn = Txn::new()
            .op(Op::sadd(keys::CONTRACT_REGISTRY, record.book.to_hex()))
            .op(Op::set(
                keys::mint_tx(&record.tx_hash),
                encode_record(record)?,
                Some(self.mint_record_ttl),
            ))
            .op(Op::hincr_by(keys::DAILY_MINTS, today, 1))
            .op(Op::hdel(keys::PENDING_REDEMPTIONS, record.code.to_hex()));
        self.store.commit(txn).await?;
        Ok(())
    }
}

impl VoucherService {
    pub fn new(
        store: Arc<dyn StateStore>,
        pool: Arc<RelayerPool>,
        config: VoucherConfig,
        ledger_config: &LedgerConfig,
        metrics: Arc<RelayMetrics>,
    ) -> VaultResult<Self> {
        let mint_call = CallSignature::parse(&config.mint_signature)?;
        if config.max_concurrent_mints == 0 {
            return Err(VaultError::Config("max_concurrent_mints must be greater than 0".into()));
        }

        Ok(Self {
            ledger: pool.ledger(),
            roles: RoleResolver::new(store.clone()),
            mint_permits: Arc::new(Semaphore::new(config.max_concurrent_mints)),
            books: Bookkeeper {
                store: store.clone(),
                metrics: metrics.clone(),
                mint_record_ttl: Duration::from_secs(config.mint_record_ttl_secs),
            },
            mint_gas: U256::from(ledger_config.mint_gas_limit),
            store,
            pool,
            config,
            mint_call,
            metrics,
        })
    }

    pub fn roles(&self) -> &RoleResolver {
        &self.roles
    }

    pub fn default_contract(&self) -> Option<EthAddress> {
        self.config.default_contract
    }

    pub async fn issue_codes(
        &self,
        count: usize,
        class: CodeClass,
        book: Option<EthAddress>,
    ) -> VaultResult<Vec<IssuedCode>> {
        issuance::issue_codes(self.store.as_ref(), count, class, book).await
    }

    /// Consumes `code` and relays one mint to `recipient`.
    ///
    /// The valid → used move is a single guarded commit; exactly one of any
    /// number of concurrent callers gets past it. Definitive submission
    /// failures put the code back. An unconfirmed broadcast leaves the code
    /// consumed and records it for [`Self::reconcile_pending`].
    pub async fn redeem(
        &self,
        code: &CodeHash,
        recipient: &EthAddress,
        book: Option<EthAddress>,
    ) -> VaultResult<Redemption> {
        if recipient.is_zero() {
            return Err(VaultError::InvalidInput("Recipient must not be the zero account".into()));
        }

        let permit = self
            .mint_permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| VaultError::Busy("mint service busy, retry later".into()))?;

        let book = match book {
            Some(book) => book,
            None => self.resolve_book(code, None).await?.ok_or_else(|| {
                VaultError::Config("No book contract for this code and no default configured".into())
            })?,
        };

        let member = code.to_hex();
        let consumed = self
            .store
            .commit(
                Txn::new()
                    .guard(Guard::is_member(keys::VALID_CODES, &member))
                    .op(Op::srem(keys::VALID_CODES, &member))
                    .op(Op::sadd(keys::USED_CODES, &member)),
            )
            .await?;

        if !consumed.is_committed() {
            RelayMetrics::incr(&self.metrics.redemptions_rejected);
            return Err(self.rejection(code).await?);
        }
        debug!("Code {} consumed for {}", code, recipient);

        // From here on the code is consumed. Submission and its settlement
        // run in their own task so a dropped caller cannot strand the code.
        let payload = self
            .mint_call
            .encode(&[Token::Address(to_address(recipient))]);
        let pool = self.pool.clone();
        let books = self.books.clone();
        let gas = self.mint_gas;
        let (code, recipient) = (*code, *recipient);

        let task = tokio::spawn(async move {
            let _permit = permit;
            let outcome = pool.submit(to_address(&book), payload, gas).await;
            books.settle_submission(code, recipient, book, outcome).await
        });

        task.await
            .map_err(|e| VaultError::Internal(format!("Redemption task for {} failed: {}", code, e)))?
    }

    async fn rejection(&self, code: &CodeHash) -> VaultResult<VaultError> {
        if self.store.sismember(keys::USED_CODES, &code.to_hex()).await? {
            Ok(VaultError::AlreadyUsed(code.to_hex()))
        } else {
            Ok(VaultError::InvalidCode(code.to_hex()))
        }
    }

    /// Settles unconfirmed redemptions from their receipts.
    pub async fn reconcile_pending(&self) -> VaultResult<ReconcileReport> {
        let entries = self.store.hgetall(keys::PENDING_REDEMPTIONS).await?;
        let mut report = ReconcileReport::default();

        for (field, raw) in entries {
            report.checked += 1;
            let pending: PendingRedemption = match decode_record(keys::PENDING_REDEMPTIONS, &raw) {
                Ok(p) => p,
                Err(e) => {
                    error!("Dropping unreadable pending entry {}: {}", field, e);
                    let drop = Txn::new().op(Op::hdel(keys::PENDING_REDEMPTIONS, &field));
                    if let Err(e) = self.store.commit(drop).await {
                        warn!("Could not drop pending entry {}: {}", field, e);
                    }
                    report.errors += 1;
                    continue;
                }
            };

            match self.settle(&pending).await {
                Ok(Settled::Finalized) => report.finalized += 1,
                Ok(Settled::Restored) => report.restored += 1,
                Ok(Settled::Pending) => report.pending += 1,
                Err(e) => {
                    warn!("Reconciling {} failed: {}", pending.tx_hash, e);
                    report.errors += 1;
                }
            }
        }

        if report.checked > 0 {
            info!(
                "Reconciled {} pending redemptions: {} finalized, {} restored, {} pending",
                report.checked, report.finalized, report.restored, report.pending
            );
        }
        Ok(report)
    }

    async fn settle(&self, pending: &PendingRedemption) -> VaultResult<Settled> {
        let hash = parse_hash(&pending.tx_hash)?;
        let receipt = match self.ledger.receipt(hash).await? {
            Some(receipt) => receipt,
            None => return Ok(Settled::Pending),
        };

        let succeeded = receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false);
        if succeeded {
            let redemption = Redemption {
                code: pending.code,
                recipient: pending.recipient,
                book: pending.book,
                relayer: from_address(receipt.from),
                tx_hash: pending.tx_hash.clone(),
            };
            self.books.finalize(&redemption).await;
            return Ok(Settled::Finalized);
        }

        let member = pending.code.to_hex();
        let restore = Txn::new()
            .guard(Guard::is_member(keys::USED_CODES, &member))
            .op(Op::srem(keys::USED_CODES, &member))
            .op(Op::sadd(keys::VALID_CODES, &member))
            .op(Op::hdel(keys::PENDING_REDEMPTIONS, &member));
        if self.store.commit(restore).await?.is_committed() {
            RelayMetrics::incr(&self.metrics.compensations);
            warn!("Restored code {}: transaction {} failed on ledger", pending.code, pending.tx_hash);
        } else {
            self.store
                .commit(Txn::new().op(Op::hdel(keys::PENDING_REDEMPTIONS, &member)))
                .await?;
        }
        Ok(Settled::Restored)
    }

    pub async fn run_reconciler(self: Arc<Self>, mut cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.reconcile_interval_secs));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile_pending().await {
                        warn!("Reconciliation pass failed: {}", e);
                    }
                }
            }
        }
        debug!("Reconciler stopped");
    }

    pub async fn load_binding(&self, code: &CodeHash) -> VaultResult<Option<BindingRecord>> {
        let key = keys::binding(code);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(decode_record(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// Book contract for a code: binding, then the issuance mapping, then
    /// the configured default.
    pub async fn resolve_book(
        &self,
        code: &CodeHash,
        binding: Option<&BindingRecord>,
    ) -> VaultResult<Option<EthAddress>> {
        let binding_book = match binding {
            Some(b) => b.book,
            None => self.load_binding(code).await?.and_then(|b| b.book),
        };
        if let Some(book) = binding_book {
            return Ok(Some(book));
        }

        if let Some(raw) = self.store.hget(keys::CODE_BOOKS, &code.to_hex()).await? {
            match EthAddress::from_hex(&raw) {
                Ok(book) => return Ok(Some(book)),
                Err(_) => warn!("Ignoring malformed book mapping for code {}", code),
            }
        }

        Ok(self.config.default_contract)
    }

    /// Pre-flight check of a presented code, optionally with the presenting
    /// account.
    pub async fn verify(&self, code: &CodeHash, address: Option<&EthAddress>) -> VaultResult<Verification> {
        if let (Some(admin_code), Some(admin_address), Some(address)) =
            (&self.config.admin_code, &self.config.admin_address, address)
        {
            if admin_code == code && admin_address == address {
                return Ok(Verification {
                    status: VerifyStatus::AdminAccess,
                    role: Role::Publisher,
                    address: Some(*address),
                });
            }
        }

        let used = self.store.sismember(keys::USED_CODES, &code.to_hex()).await?;
        let binding = self.load_binding(code).await?;

        if let Some(address) = address {
            match &binding {
                Some(b) if b.address == *address => {
                    return Ok(Verification {
                        status: VerifyStatus::AlreadyOwned,
                        role: b.role,
                        address: Some(b.address),
                    });
                }
                None if used && self.config.self_heal_bindings => {
                    if let Some(owned) = self.self_heal(code, address).await? {
                        return Ok(owned);
                    }
                }
                _ => {}
            }
        }

        if used {
            return Err(VaultError::AlreadyUsed(code.to_hex()));
        }

        let role = self.roles.resolve(Some(code), address).await?;
        if !role.is_authorized() {
            return Err(VaultError::InvalidCode(code.to_hex()));
        }

        Ok(Verification {
            status: VerifyStatus::Valid,
            role,
            address: binding.map(|b| b.address),
        })
    }

    async fn self_heal(&self, code: &CodeHash, address: &EthAddress) -> VaultResult<Option<Verification>> {
        let record = BindingRecord {
            address: *address,
            role: Role::Reader,
            book: None,
            tx_hash: None,
            source: BindingSource::SelfHealed,
            bound_at: chrono::Utc::now().timestamp(),
        };

        let written = self
            .store
            .set_nx(&keys::binding(code), &encode_record(&record)?, None)
            .await?;
        let winner = if written {
            info!("Bound legacy code {} to {}", code, address);
            Some(record)
        } else {
            self.load_binding(code).await?
        };

        Ok(winner.filter(|b| b.address == *address).map(|b| Verification {
            status: VerifyStatus::AlreadyOwned,
            role: b.role,
            address: Some(b.address),
        }))
    }

    /// Binding lookup. A reader code without a binding gets a freshly
    /// generated account; concurrent callers converge on the same one.
    pub async fn get_binding(&self, code: &CodeHash) -> VaultResult<BindingView> {
        if self.store.sismember(keys::USED_CODES, &code.to_hex()).await? {
            return Err(VaultError::AlreadyUsed(code.to_hex()));
        }

        let existing = self.load_binding(code).await?;
        let role = self
            .roles
            .resolve(Some(code), existing.as_ref().map(|b| &b.address))
            .await?;
        let (binding, generated) = match existing {
            Some(binding) => (binding, false),
            None if role == Role::Reader => self.generate_reader_binding(code).await?,
            None => return Err(VaultError::NotFound(format!("No binding for code {}", code))),
        };

        let book_address = self.resolve_book(code, Some(&binding)).await?;
        Ok(BindingView {
            code: *code,
            role: if role.is_authorized() { role } else { binding.role },
            address: binding.address,
            book_address,
            generated,
        })
    }

    async fn generate_reader_binding(&self, code: &CodeHash) -> VaultResult<(BindingRecord, bool)> {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let address = from_address(wallet.address());
        let secret = Zeroizing::new(hex::encode(wallet.signer().to_bytes()));

        let record = BindingRecord {
            address,
            role: Role::Reader,
            book: None,
            tx_hash: None,
            source: BindingSource::Generated,
            bound_at: chrono::Utc::now().timestamp(),
        };

        let key = keys::binding(code);
        let txn = Txn::new()
            .guard(Guard::key_absent(&key))
            .op(Op::set(&key, encode_record(&record)?, None))
            .op(Op::hset(keys::READER_KEYS, address.to_hex(), secret.as_str()));

        if self.store.commit(txn).await?.is_committed() {
            info!("Generated reader account {} for code {}", address, code);
            return Ok((record, true));
        }

        let existing = self
            .load_binding(code)
            .await?
            .ok_or_else(|| VaultError::Internal(format!("Binding for {} vanished", code)))?;
        Ok((existing, false))
    }

    /// Stashes a valid code under an account toward a referral reward.
    pub async fn save_code(&self, code: &CodeHash, address: Option<&EthAddress>) -> VaultResult<SavedCode> {
        let member = code.to_hex();
        if !self.store.sismember(keys::VALID_CODES, &member).await? {
            return Err(VaultError::InvalidCode(format!("{} is used or was never issued", member)));
        }

        let count = match address {
            Some(address) => {
                let key = keys::saved_codes(address);
                self.store.sadd(&key, &member).await?;
                self.store.scard(&key).await?
            }
            None => 0,
        };

        Ok(SavedCode { code: *code, count })
    }

    pub async fn saved_codes(&self, address: &EthAddress) -> VaultResult<Vec<CodeHash>> {
        let members = self.store.smembers(&keys::saved_codes(address)).await?;
        let mut codes: Vec<CodeHash> = members
            .iter()
            .filter_map(|m| match CodeHash::parse(m) {
                Ok(code) => Some(code),
                Err(_) => {
                    warn!("Skipping malformed saved code for {}", address);
                    None
                }
            })
            .collect();
        codes.sort();
        Ok(codes)
    }

    pub async fn check_access(&self, address: &EthAddress) -> VaultResult<AccessReport> {
        self.roles.check_access(address).await
    }

    /// Cumulative mints per day, oldest first.
    pub async fn daily_sales(&self) -> VaultResult<Vec<DailySales>> {
        let mut days: Vec<(String, u64)> = self
            .store
            .hgetall(keys::DAILY_MINTS)
            .await?
            .into_iter()
            .map(|(date, count)| {
                let count = count.parse::<u64>().unwrap_or_else(|_| {
                    warn!("Ignoring malformed daily count for {}", date);
                    0
                });
                (date, count)
            })
            .collect();
        days.sort();

        let mut total = 0u64;
        Ok(days
            .into_iter()
            .map(|(date, count)| {
                total += count;
                DailySales { date, sales: total }
            })
            .collect())
    }

    pub async fn pending_count(&self) -> VaultResult<usize> {
        Ok(self.store.hgetall(keys::PENDING_REDEMPTIONS).await?.len())
    }

    pub fn pool(&self) -> &RelayerPool {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn mint_permits_for_test(&self) -> &Semaphore {
        &self.mint_permits
    }
}

enum Settled {
    Finalized,
    Restored,
    Pending,
}
