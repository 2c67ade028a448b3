//! Key layout of the shared state store.

use vault_types::{CodeHash, EthAddress};

pub const VALID_CODES: &str = "vault:codes:valid";
pub const USED_CODES: &str = "vault:codes:used";
pub const CODE_BOOKS: &str = "vault:codes:book_addr";
/// Redemptions whose submission outcome is not yet known, keyed by code.
pub const PENDING_REDEMPTIONS: &str = "vault:codes:pending";

pub const PUBLISHER_CODES: &str = "vault:roles:publishers_codes";
pub const AUTHOR_CODES: &str = "vault:roles:authors_codes";
pub const PUBLISHERS: &str = "vault:roles:publishers";
pub const AUTHORS: &str = "vault:roles:authors";
pub const ADMINS: &str = "vault:roles:admins";

/// Generated reader account keys, keyed by account. Never served.
pub const READER_KEYS: &str = "vault:reader:keys";

pub const CONTRACT_REGISTRY: &str = "vault:nft:contracts";
pub const DAILY_MINTS: &str = "vault:stats:daily_mints";

pub const REFERRER_STATS: &str = "reward:referrer_stats";
pub const CLAIMED_REWARD_CODES: &str = "reward:codes:claimed";

pub fn binding(code: &CodeHash) -> String {
    format!("vault:bind:{}", code)
}

pub fn saved_codes(address: &EthAddress) -> String {
    format!("vault:saved:{}", address)
}

pub fn mint_tx(tx_hash: &str) -> String {
    format!("vault:tx:mint:{}", tx_hash)
}

pub fn tx_processed(tx_hash: &str) -> String {
    format!("tx:processed:{}", tx_hash)
}

pub fn tx_result(tx_hash: &str) -> String {
    format!("tx:result:{}", tx_hash)
}

pub fn reader_nfts(address: &EthAddress) -> String {
    format!("vault:reader:{}:nfts", address)
}

pub fn reward_business(business_id: &str) -> String {
    format!("reward:business:{}", business_id)
}

pub fn reward_recipient(address: &EthAddress) -> String {
    format!("reward:recipient:{}", address)
}

pub fn referrer_rewards(address: &EthAddress) -> String {
    format!("reward:referrer:{}:hashes", address)
}

/// Per-contract scan checkpoint and aggregates.
pub struct NftStatsKeys {
    pub last_block: String,
    pub minted_total: String,
    pub unique_minters: String,
    pub unique_real_users: String,
    pub minters: String,
    pub real_users: String,
    pub mint_events: String,
}

impl NftStatsKeys {
    pub fn new(contract: &EthAddress) -> Self {
        let base = format!("vault:stats:nft:{}", contract);
        Self {
            last_block: format!("{}:last_block", base),
            minted_total: format!("{}:minted_total", base),
            unique_minters: format!("{}:unique_minters", base),
            unique_real_users: format!("{}:unique_real_users", base),
            minters: format!("{}:minters:set", base),
            real_users: format!("{}:real_users:set", base),
            mint_events: format!("{}:mint_events:set", base),
        }
    }
}
