use serde::{Deserialize, Serialize};
use std::time::Duration;
use vault_types::EthAddress;

/// System account that receives mints on behalf of the platform.
pub const SYSTEM_ACCOUNT: EthAddress = EthAddress([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0x00,
]);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackedContract {
    pub address: EthAddress,
    #[serde(default)]
    pub start_block: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub enabled: bool,
    pub default_start_block: u64,
    pub chunk_size: u64,
    pub interval_secs: u64,
    pub registry_poll_secs: u64,
    pub reserved_addresses: Vec<EthAddress>,
    pub contracts: Vec<TrackedContract>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_start_block: 0,
            chunk_size: 50_000,
            interval_secs: 60,
            registry_poll_secs: 30,
            reserved_addresses: vec![SYSTEM_ACCOUNT],
            contracts: Vec::new(),
        }
    }
}

impl IndexerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn start_block_for(&self, contract: &EthAddress) -> u64 {
        self.contracts
            .iter()
            .find(|c| &c.address == contract)
            .and_then(|c| c.start_block)
            .unwrap_or(self.default_start_block)
    }
}
