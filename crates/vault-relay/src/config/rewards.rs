use serde::{Deserialize, Serialize};
use vault_types::EthAddress;

pub const DEFAULT_DISPENSE_SIGNATURE: &str = "dispenseTokens(address,bytes32)";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub contract: Option<EthAddress>,
    pub dispense_signature: String,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            contract: None,
            dispense_signature: DEFAULT_DISPENSE_SIGNATURE.to_string(),
        }
    }
}
