//! Shared state store: the durable source of truth for voucher state,
//! bindings, reward bookkeeping and scan checkpoints.
//!
//! All cross-key invariants go through [`StateStore::commit`], which applies a
//! guarded batch atomically. Single-key helpers are atomic on their own key.

pub mod keys;
mod metrics;
mod sled_store;
mod txn;

pub use metrics::{StorageMetrics, StorageMetricsSnapshot};
pub use sled_store::SledStore;
pub use txn::{Guard, Op, Txn, TxnOutcome};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use vault_types::{VaultError, VaultResult};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns true when the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> VaultResult<bool>;

    /// Returns true when the member was present.
    async fn srem(&self, key: &str, member: &str) -> VaultResult<bool>;

    async fn sismember(&self, key: &str, member: &str) -> VaultResult<bool>;

    async fn scard(&self, key: &str) -> VaultResult<u64>;

    async fn smembers(&self, key: &str) -> VaultResult<Vec<String>>;

    async fn hget(&self, key: &str, field: &str) -> VaultResult<Option<String>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> VaultResult<()>;

    async fn hgetall(&self, key: &str) -> VaultResult<Vec<(String, String)>>;

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> VaultResult<i64>;

    async fn get(&self, key: &str) -> VaultResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> VaultResult<()>;

    /// Writes only when the key is absent or expired. Returns true on write.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> VaultResult<bool>;

    async fn exists(&self, key: &str) -> VaultResult<bool>;

    async fn del(&self, key: &str) -> VaultResult<bool>;

    async fn incr_by(&self, key: &str, delta: i64) -> VaultResult<i64>;

    /// Applies every op or none of them; a failed guard mutates nothing.
    async fn commit(&self, txn: Txn) -> VaultResult<TxnOutcome>;
}

/// Encodes a structured record for storage under a string key or hash field.
pub fn encode_record<T: Serialize>(record: &T) -> VaultResult<String> {
    serde_json::to_string(record)
        .map_err(|e| VaultError::Internal(format!("Failed to encode record: {}", e)))
}

/// Decodes a stored record, rejecting anything that does not match the schema.
pub fn decode_record<T: DeserializeOwned>(key: &str, raw: &str) -> VaultResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| VaultError::Storage(format!("Corrupt record at {}: {}", key, e)))
}
