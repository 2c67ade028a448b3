use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vault_types::{EthAddress, VaultError, VaultResult};

use super::api::ApiConfig;
use super::indexer::IndexerConfig;
use super::ledger::LedgerConfig;
use super::logging::LoggingConfig;
use super::relayers::RelayerConfig;
use super::rewards::RewardConfig;
use super::storage::StorageConfig;
use super::types::{LogLevel, SecretKey};
use super::vouchers::VoucherConfig;
use crate::ledger::CallSignature;

/// Highest numbered `PRIVATE_KEY_n` variable read from the environment.
const MAX_ENV_KEYS: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub data_dir: PathBuf,
    pub ledger: LedgerConfig,
    pub relayers: RelayerConfig,
    pub vouchers: VoucherConfig,
    pub rewards: RewardConfig,
    pub indexer: IndexerConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/lib/vault-relay"));

        Self {
            data_dir: home.join(".vault-relay"),
            ledger: LedgerConfig::default(),
            relayers: RelayerConfig::default(),
            vouchers: VoucherConfig::default(),
            rewards: RewardConfig::default(),
            indexer: IndexerConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn load(path: impl AsRef<Path>) -> VaultResult<Self> {
        let mut config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file and applies environment overrides without validating.
    pub fn load_unvalidated(path: impl AsRef<Path>) -> VaultResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| VaultError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| VaultError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> VaultResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| VaultError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VaultError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| VaultError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("VAULT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(rpc) = lookup("VAULT_RPC_URL") {
            self.ledger.rpc_url = rpc.trim().to_string();
        }

        if let Some(id) = lookup("VAULT_CHAIN_ID") {
            if let Ok(id) = id.trim().parse() {
                self.ledger.chain_id = id;
            }
        }

        let env_keys = Self::keys_from_env(&lookup);
        if !env_keys.is_empty() {
            self.relayers.private_keys = env_keys;
        }

        if let Some(addr) = lookup("VAULT_DEFAULT_CONTRACT") {
            match EthAddress::from_hex(&addr) {
                Ok(a) => self.vouchers.default_contract = Some(a),
                Err(e) => warn!("Ignoring VAULT_DEFAULT_CONTRACT: {}", e),
            }
        }

        if let Some(addr) = lookup("VAULT_REWARD_CONTRACT") {
            match EthAddress::from_hex(&addr) {
                Ok(a) => self.rewards.contract = Some(a),
                Err(e) => warn!("Ignoring VAULT_REWARD_CONTRACT: {}", e),
            }
        }

        if let Some(port) = lookup("VAULT_API_PORT") {
            if let Ok(p) = port.trim().parse() {
                self.api.port = p;
            }
        }

        if let Some(bind) = lookup("VAULT_API_BIND") {
            if let Ok(addr) = bind.trim().parse::<IpAddr>() {
                self.api.bind_address = addr;
                if !addr.is_loopback() {
                    warn!(
                        "API server binding to non-localhost address: {}. Ensure proper firewall rules.",
                        bind
                    );
                }
            }
        }

        if let Some(level) = lookup("VAULT_LOG_LEVEL") {
            self.logging.level = LogLevel::parse_lossy(&level);
        }

        if lookup("VAULT_LOG_JSON").is_some() {
            self.logging.json = true;
        }
    }

    /// `VAULT_RELAYER_KEYS` (comma separated) wins over `PRIVATE_KEY_0..9`,
    /// which wins over the single legacy `PRIVATE_KEY`.
    fn keys_from_env<F>(lookup: &F) -> Vec<SecretKey>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup("VAULT_RELAYER_KEYS") {
            let keys: Vec<SecretKey> = list
                .split(',')
                .map(SecretKey::new)
                .filter(|k| !k.is_empty())
                .collect();
            if !keys.is_empty() {
                return keys;
            }
        }

        let numbered: Vec<SecretKey> = (0..MAX_ENV_KEYS)
            .filter_map(|i| lookup(&format!("PRIVATE_KEY_{}", i)))
            .map(SecretKey::new)
            .filter(|k| !k.is_empty())
            .collect();
        if !numbered.is_empty() {
            return numbered;
        }

        lookup("PRIVATE_KEY")
            .map(SecretKey::new)
            .filter(|k| !k.is_empty())
            .into_iter()
            .collect()
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.relayers.private_keys.is_empty() {
            return Err(VaultError::Config(
                "No signing identities configured (set PRIVATE_KEY_0..9 or relayers.private_keys)".into(),
            ));
        }

        if self.ledger.rpc_url.trim().is_empty() {
            return Err(VaultError::Config("Ledger RPC endpoint is not configured".into()));
        }

        if self.ledger.chain_id == 0 {
            return Err(VaultError::Config("Chain ID cannot be 0".into()));
        }

        if self.ledger.request_timeout_secs == 0 {
            return Err(VaultError::Config("Ledger request timeout cannot be 0".into()));
        }

        if self.vouchers.max_concurrent_mints == 0 {
            return Err(VaultError::Config("max_concurrent_mints must be at least 1".into()));
        }

        CallSignature::parse(&self.vouchers.mint_signature)?;
        CallSignature::parse(&self.rewards.dispense_signature)?;

        if self.indexer.chunk_size == 0 {
            return Err(VaultError::Config("Indexer chunk size cannot be 0".into()));
        }

        if self.indexer.interval_secs == 0 || self.indexer.registry_poll_secs == 0 {
            return Err(VaultError::Config("Indexer intervals cannot be 0".into()));
        }

        if self.api.enabled && self.api.port == 0 {
            return Err(VaultError::Config("API port cannot be 0".into()));
        }

        if self.vouchers.default_contract.is_none() {
            warn!("No default mint contract configured; codes without a book mapping cannot be redeemed");
        }

        if self.rewards.contract.is_none() {
            warn!("No reward contract configured; referral rewards are disabled");
        }

        if self.vouchers.admin_code.is_some() != self.vouchers.admin_address.is_some() {
            warn!("Admin code and admin address must both be set for admin verification");
        }

        Ok(())
    }

    pub fn api_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.api.bind_address, self.api.port)
    }

    pub fn storage_path(&self) -> PathBuf {
        if self.storage.path.is_absolute() {
            self.storage.path.clone()
        } else {
            self.data_dir.join(&self.storage.path)
        }
    }

    pub fn redacted(&self) -> RedactedConfig {
        RedactedConfig {
            data_dir: self.data_dir.clone(),
            rpc_url: self.ledger.rpc_url.clone(),
            chain_id: self.ledger.chain_id,
            relayer_count: self.relayers.private_keys.len(),
            min_balance_gwei: self.relayers.min_balance_gwei,
            default_contract: self.vouchers.default_contract,
            reward_contract: self.rewards.contract,
            tracked_contracts: self.indexer.contracts.len(),
            indexer_enabled: self.indexer.enabled,
            api: self.api_socket_addr(),
            api_enabled: self.api.enabled,
        }
    }
}

#[derive(Debug)]
pub struct RedactedConfig {
    pub data_dir: PathBuf,
    pub rpc_url: String,
    pub chain_id: u64,
    pub relayer_count: usize,
    pub min_balance_gwei: Option<u64>,
    pub default_contract: Option<EthAddress>,
    pub reward_contract: Option<EthAddress>,
    pub tracked_contracts: usize,
    pub indexer_enabled: bool,
    pub api: SocketAddr,
    pub api_enabled: bool,
}

impl std::fmt::Display for RedactedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |a: &Option<EthAddress>| a.map(|a| a.to_hex()).unwrap_or_else(|| "-".into());

        writeln!(f, "Vault Relay Configuration")?;
        writeln!(f, "=========================")?;
        writeln!(f, "Data dir: {:?}", self.data_dir)?;
        writeln!(f, "Ledger: {} (chain {})", self.rpc_url, self.chain_id)?;
        writeln!(f, "Relayers: {}", self.relayer_count)?;
        if let Some(floor) = self.min_balance_gwei {
            writeln!(f, "Balance floor: {} gwei", floor)?;
        }
        writeln!(f, "Default contract: {}", show(&self.default_contract))?;
        writeln!(f, "Reward contract: {}", show(&self.reward_contract))?;
        writeln!(
            f,
            "Indexer: {} ({} static contracts)",
            if self.indexer_enabled { "enabled" } else { "disabled" },
            self.tracked_contracts
        )?;
        write!(
            f,
            "API: {}{}",
            self.api,
            if self.api_enabled { "" } else { " (disabled)" }
        )
    }
}
