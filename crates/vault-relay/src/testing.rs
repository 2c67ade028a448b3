//! Shared fixtures for service tests: a temporary store, the mock ledger and
//! a small relayer pool over it.

use crate::config::{LedgerConfig, VoucherConfig};
use crate::ledger::mock::MockLedger;
use crate::metrics::RelayMetrics;
use crate::relayer::{RelayerPool, SigningIdentity};
use crate::store::{keys, SledStore, StateStore};
use crate::voucher::VoucherService;
use ethers::signers::LocalWallet;
use std::sync::Arc;
use vault_types::{CodeHash, EthAddress};

pub(crate) struct Harness {
    pub store: Arc<SledStore>,
    pub ledger: Arc<MockLedger>,
    pub pool: Arc<RelayerPool>,
    pub metrics: Arc<RelayMetrics>,
}

impl Harness {
    pub fn new(relayers: usize) -> Self {
        let store = Arc::new(SledStore::temporary().unwrap());
        let ledger = Arc::new(MockLedger::new());
        let metrics = Arc::new(RelayMetrics::new());
        let identities = (0..relayers)
            .map(|_| SigningIdentity::from_wallet(LocalWallet::new(&mut rand::thread_rng())))
            .collect();
        let pool = Arc::new(
            RelayerPool::new(identities, ledger.clone(), 31337, None, metrics.clone()).unwrap(),
        );
        Self { store, ledger, pool, metrics }
    }

    pub fn vouchers(&self, config: VoucherConfig) -> VoucherService {
        VoucherService::new(
            self.store.clone(),
            self.pool.clone(),
            config,
            &LedgerConfig::default(),
            self.metrics.clone(),
        )
        .unwrap()
    }

    pub async fn issue_valid(&self, raw: &str) -> CodeHash {
        let code = CodeHash::of_raw(raw);
        self.store.sadd(keys::VALID_CODES, &code.to_hex()).await.unwrap();
        code
    }

    pub async fn is_valid(&self, code: &CodeHash) -> bool {
        self.store.sismember(keys::VALID_CODES, &code.to_hex()).await.unwrap()
    }

    pub async fn is_used(&self, code: &CodeHash) -> bool {
        self.store.sismember(keys::USED_CODES, &code.to_hex()).await.unwrap()
    }
}

pub(crate) fn book() -> EthAddress {
    EthAddress([0xb0; 20])
}

pub(crate) fn reader(n: u8) -> EthAddress {
    EthAddress([n; 20])
}

pub(crate) fn voucher_config() -> VoucherConfig {
    VoucherConfig {
        default_contract: Some(book()),
        ..Default::default()
    }
}
