use crate::config::SecretKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use vault_types::{VaultError, VaultResult};

/// Nonce state of one identity. Only touched while holding its lock.
pub(crate) struct NonceSlot {
    pub nonce: U256,
    pub needs_resync: bool,
}

/// A relayer key plus its cached nonce and balance.
pub struct SigningIdentity {
    pub(crate) wallet: LocalWallet,
    address: Address,
    pub(crate) slot: Mutex<NonceSlot>,
    balance: RwLock<Option<U256>>,
    submissions: AtomicU64,
    failures: AtomicU64,
}

impl SigningIdentity {
    pub fn from_key(key: &SecretKey, chain_id: u64) -> VaultResult<Self> {
        let wallet: LocalWallet = key
            .expose()
            .parse()
            .map_err(|_| VaultError::Config("Invalid relayer private key".into()))?;

        Ok(Self::from_wallet(wallet.with_chain_id(chain_id)))
    }

    pub fn from_wallet(wallet: LocalWallet) -> Self {
        let address = wallet.address();
        Self {
            wallet,
            address,
            slot: Mutex::new(NonceSlot {
                nonce: U256::zero(),
                needs_resync: true,
            }),
            balance: RwLock::new(None),
            submissions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Unknown balances count as funded; the node rejects what cannot pay.
    pub fn is_funded(&self, floor: Option<U256>) -> bool {
        match (floor, *self.balance.read()) {
            (Some(floor), Some(balance)) => balance >= floor,
            _ => true,
        }
    }

    pub fn set_balance(&self, wei: U256) {
        *self.balance.write() = Some(wei);
    }

    pub fn balance(&self) -> Option<U256> {
        *self.balance.read()
    }

    pub(crate) fn record_success(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) -> IdentityStatus {
        let nonce = self
            .slot
            .try_lock()
            .ok()
            .filter(|slot| !slot.needs_resync)
            .and_then(|slot| u64::try_from(slot.nonce).ok());

        IdentityStatus {
            address: format!("{:?}", self.address),
            nonce,
            balance_wei: self.balance().map(|b| b.to_string()),
            submissions: self.submissions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityStatus {
    pub address: String,
    /// `None` while the identity is busy or awaiting a resync.
    pub nonce: Option<u64>,
    pub balance_wei: Option<String>,
    pub submissions: u64,
    pub failures: u64,
}
