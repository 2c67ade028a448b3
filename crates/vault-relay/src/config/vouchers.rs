use serde::{Deserialize, Serialize};
use vault_types::{CodeHash, EthAddress};

pub const DEFAULT_MINT_SIGNATURE: &str = "mintToReader(address)";

const SEVEN_DAYS_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VoucherConfig {
    pub default_contract: Option<EthAddress>,
    pub mint_signature: String,
    /// Bind used-but-unbound legacy codes to the presenting account on verify.
    pub self_heal_bindings: bool,
    pub max_concurrent_mints: usize,
    pub admin_code: Option<CodeHash>,
    pub admin_address: Option<EthAddress>,
    pub reconcile_interval_secs: u64,
    pub mint_record_ttl_secs: u64,
}

impl Default for VoucherConfig {
    fn default() -> Self {
        Self {
            default_contract: None,
            mint_signature: DEFAULT_MINT_SIGNATURE.to_string(),
            self_heal_bindings: true,
            max_concurrent_mints: 5,
            admin_code: None,
            admin_address: None,
            reconcile_interval_secs: 30,
            mint_record_ttl_secs: SEVEN_DAYS_SECS,
        }
    }
}
