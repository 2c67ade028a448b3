use crate::store::{keys::NftStatsKeys, StateStore};
use serde::Serialize;
use vault_types::{EthAddress, VaultResult};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractStats {
    pub contract: EthAddress,
    pub minted_total: u64,
    pub unique_minters: u64,
    pub unique_real_users: u64,
    pub last_scanned_block: Option<u64>,
}

impl ContractStats {
    /// Reads the aggregates of one contract. Unique counts come from the
    /// cached cardinalities, falling back to the sets themselves.
    pub async fn load(store: &dyn StateStore, contract: &EthAddress) -> VaultResult<Self> {
        let keys = NftStatsKeys::new(contract);

        let unique_minters = match read_u64(store, &keys.unique_minters).await? {
            Some(n) => n,
            None => store.scard(&keys.minters).await?,
        };
        let unique_real_users = match read_u64(store, &keys.unique_real_users).await? {
            Some(n) => n,
            None => store.scard(&keys.real_users).await?,
        };

        Ok(Self {
            contract: *contract,
            minted_total: read_u64(store, &keys.minted_total).await?.unwrap_or(0),
            unique_minters,
            unique_real_users,
            last_scanned_block: read_u64(store, &keys.last_block).await?,
        })
    }
}

pub(crate) async fn read_u64(store: &dyn StateStore, key: &str) -> VaultResult<Option<u64>> {
    Ok(store.get(key).await?.and_then(|raw| raw.trim().parse().ok()))
}
