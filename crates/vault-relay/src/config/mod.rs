mod api;
mod indexer;
mod ledger;
mod logging;
mod relay;
mod relayers;
mod rewards;
mod storage;
mod types;
mod vouchers;

pub use api::{ApiConfig, DEFAULT_API_PORT};
pub use indexer::{IndexerConfig, TrackedContract, SYSTEM_ACCOUNT};
pub use ledger::LedgerConfig;
pub use logging::LoggingConfig;
pub use relay::{RedactedConfig, RelayConfig};
pub use relayers::RelayerConfig;
pub use rewards::{RewardConfig, DEFAULT_DISPENSE_SIGNATURE};
pub use storage::StorageConfig;
pub use types::{LogLevel, SecretKey};
pub use vouchers::{VoucherConfig, DEFAULT_MINT_SIGNATURE};
