use super::types::SecretKey;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    pub private_keys: Vec<SecretKey>,
    /// Identities whose cached balance falls below this floor are skipped.
    pub min_balance_gwei: Option<u64>,
    pub balance_refresh_secs: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            private_keys: Vec::new(),
            min_balance_gwei: None,
            balance_refresh_secs: 60,
        }
    }
}
