use super::{Guard, Op, StateStore, StorageMetrics, Txn, TxnOutcome};
use crate::config::StorageConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, IVec, Tree};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use vault_types::{VaultError, VaultResult};

const SET_PREFIX: &[u8] = b"s:";
const HASH_PREFIX: &[u8] = b"h:";
const VALUE_PREFIX: &[u8] = b"k:";
const SEPARATOR: u8 = 0;

#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    expires_at: Option<i64>,
}

impl StoredValue {
    fn new(value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            expires_at: ttl.map(|t| now_millis().saturating_add(t.as_millis() as i64)),
        }
    }

    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug)]
enum TxnAbort {
    Guard(usize),
    Corrupt(String),
}

/// [`StateStore`] over a single sled tree.
///
/// Layout: `s:{key}\0{member}` for sets, `h:{key}\0{field}` for hashes and
/// `k:{key}` for strings and counters (bincode [`StoredValue`] with expiry).
pub struct SledStore {
    db: Db,
    tree: Tree,
    metrics: Arc<StorageMetrics>,
}

impl SledStore {
    pub fn open(path: &Path, config: &StorageConfig) -> VaultResult<Self> {
        info!("Opening state store at {:?}", path);

        let db = sled::Config::new()
            .path(path)
            .cache_capacity(config.cache_capacity_bytes)
            .mode(sled::Mode::HighThroughput)
            .flush_every_ms(config.flush_every_ms)
            .open()
            .map_err(|e| VaultError::Storage(format!("Failed to open database: {}", e)))?;

        Self::from_db(db)
    }

    pub fn temporary() -> VaultResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| VaultError::Storage(format!("Failed to open temp database: {}", e)))?;

        Self::from_db(db)
    }

    fn from_db(db: Db) -> VaultResult<Self> {
        let tree = db
            .open_tree("state")
            .map_err(|e| VaultError::Storage(format!("Failed to open state tree: {}", e)))?;

        Ok(Self {
            db,
            tree,
            metrics: Arc::new(StorageMetrics::new()),
        })
    }

    pub fn metrics(&self) -> Arc<StorageMetrics> {
        self.metrics.clone()
    }

    pub async fn flush(&self) -> VaultResult<()> {
        self.db
            .flush_async()
            .await
            .map(|_| ())
            .map_err(|e| self.fail(format!("Failed to flush: {}", e)))
    }

    fn fail(&self, message: String) -> VaultError {
        self.metrics.error();
        VaultError::Storage(message)
    }

    fn read_value(&self, key: &str) -> VaultResult<Option<StoredValue>> {
        self.metrics.read();
        let raw = self
            .tree
            .get(value_key(key))
            .map_err(|e| self.fail(format!("Failed to read {}: {}", key, e)))?;

        match raw {
            Some(bytes) => {
                let stored = decode_value(&bytes).map_err(|e| self.fail(e))?;
                Ok(stored.is_live(now_millis()).then_some(stored))
            }
            None => Ok(None),
        }
    }

    fn scan(&self, prefix: &[u8], key: &str) -> VaultResult<Vec<(String, IVec)>> {
        self.metrics.read();
        let start = composite_key(prefix, key, "");
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(&start) {
            let (k, v) = item.map_err(|e| self.fail(format!("Failed to scan {}: {}", key, e)))?;
            let suffix = String::from_utf8(k[start.len()..].to_vec())
                .map_err(|e| self.fail(format!("Invalid entry under {}: {}", key, e)))?;
            out.push((suffix, v));
        }
        Ok(out)
    }

    fn counter_txn<F>(&self, key: Vec<u8>, label: &str, apply: F) -> VaultResult<i64>
    where
        F: Fn(&TransactionalTree, &[u8]) -> ConflictableTransactionResult<i64, TxnAbort>,
    {
        self.metrics.write();
        let result = self.tree.transaction(|tx| apply(tx, &key[..]));
        result.map_err(|e| match e {
            TransactionError::Abort(TxnAbort::Corrupt(m)) => self.fail(format!("{}: {}", label, m)),
            TransactionError::Abort(TxnAbort::Guard(_)) => self.fail(format!("{}: unexpected guard", label)),
            TransactionError::Storage(e) => self.fail(format!("{}: {}", label, e)),
        })
    }
}

#[async_trait]
impl StateStore for SledStore {
    async fn sadd(&self, key: &str, member: &str) -> VaultResult<bool> {
        self.metrics.write();
        let previous = self
            .tree
            .insert(composite_key(SET_PREFIX, key, member), &[] as &[u8])
            .map_err(|e| self.fail(format!("Failed to add to {}: {}", key, e)))?;
        Ok(previous.is_none())
    }

    async fn srem(&self, key: &str, member: &str) -> VaultResult<bool> {
        self.metrics.delete();
        let previous = self
            .tree
            .remove(composite_key(SET_PREFIX, key, member))
            .map_err(|e| self.fail(format!("Failed to remove from {}: {}", key, e)))?;
        Ok(previous.is_some())
    }

    async fn sismember(&self, key: &str, member: &str) -> VaultResult<bool> {
        self.metrics.read();
        self.tree
            .contains_key(composite_key(SET_PREFIX, key, member))
            .map_err(|e| self.fail(format!("Failed to read {}: {}", key, e)))
    }

    async fn scard(&self, key: &str) -> VaultResult<u64> {
        Ok(self.scan(SET_PREFIX, key)?.len() as u64)
    }

    async fn smembers(&self, key: &str) -> VaultResult<Vec<String>> {
        Ok(self
            .scan(SET_PREFIX, key)?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    async fn hget(&self, key: &str, field: &str) -> VaultResult<Option<String>> {
        self.metrics.read();
        let raw = self
            .tree
            .get(composite_key(HASH_PREFIX, key, field))
            .map_err(|e| self.fail(format!("Failed to read {}: {}", key, e)))?;

        raw.map(|v| utf8(&v).map_err(|e| self.fail(e))).transpose()
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> VaultResult<()> {
        self.metrics.write();
        self.tree
            .insert(composite_key(HASH_PREFIX, key, field), value.as_bytes())
            .map_err(|e| self.fail(format!("Failed to write {}: {}", key, e)))?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> VaultResult<Vec<(String, String)>> {
        self.scan(HASH_PREFIX, key)?
            .into_iter()
            .map(|(field, v)| -> VaultResult<(String, String)> {
                Ok((field, utf8(&v).map_err(|e| self.fail(e))?))
            })
            .collect()
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> VaultResult<i64> {
        self.counter_txn(
            composite_key(HASH_PREFIX, key, field),
            "Failed to increment hash field",
            |tx, k| hash_incr(tx, k, delta),
        )
    }

    async fn get(&self, key: &str) -> VaultResult<Option<String>> {
        Ok(self.read_value(key)?.map(|v| v.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> VaultResult<()> {
        self.metrics.write();
        let encoded = encode_value(&StoredValue::new(value, ttl)).map_err(|e| self.fail(e))?;
        self.tree
            .insert(value_key(key), encoded)
            .map_err(|e| self.fail(format!("Failed to write {}: {}", key, e)))?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> VaultResult<bool> {
        self.metrics.write();
        let k = value_key(key);
        let encoded = encode_value(&StoredValue::new(value, ttl)).map_err(|e| self.fail(e))?;

        loop {
            let current = self
                .tree
                .get(&k)
                .map_err(|e| self.fail(format!("Failed to read {}: {}", key, e)))?;

            if let Some(raw) = &current {
                if decode_value(raw).map_err(|e| self.fail(e))?.is_live(now_millis()) {
                    return Ok(false);
                }
            }

            let swapped = self
                .tree
                .compare_and_swap(&k, current, Some(encoded.clone()))
                .map_err(|e| self.fail(format!("Failed to write {}: {}", key, e)))?;

            if swapped.is_ok() {
                return Ok(true);
            }
            debug!("set_nx contention on {}, retrying", key);
        }
    }

    async fn exists(&self, key: &str) -> VaultResult<bool> {
        Ok(self.read_value(key)?.is_some())
    }

    async fn del(&self, key: &str) -> VaultResult<bool> {
        self.metrics.delete();
        let previous = self
            .tree
            .remove(value_key(key))
            .map_err(|e| self.fail(format!("Failed to delete {}: {}", key, e)))?;
        Ok(previous.is_some())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> VaultResult<i64> {
        self.counter_txn(value_key(key), "Failed to increment counter", |tx, k| {
            value_incr(tx, k, delta)
        })
    }

    async fn commit(&self, txn: Txn) -> VaultResult<TxnOutcome> {
        self.metrics.commits.fetch_add(1, Ordering::Relaxed);

        let result = self.tree.transaction(|tx| {
            let now = now_millis();

            for (index, guard) in txn.guards.iter().enumerate() {
                let holds = match guard {
                    Guard::IsMember { key, member } => {
                        tx.get(composite_key(SET_PREFIX, key, member))?.is_some()
                    }
                    Guard::NotMember { key, member } => {
                        tx.get(composite_key(SET_PREFIX, key, member))?.is_none()
                    }
                    Guard::KeyAbsent { key } => match tx.get(value_key(key))? {
                        Some(raw) => !decode_value(&raw).map_err(abort)?.is_live(now),
                        None => true,
                    },
                };
                if !holds {
                    return Err(ConflictableTransactionError::Abort(TxnAbort::Guard(index)));
                }
            }

            for op in &txn.ops {
                apply_op(tx, op)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(TxnOutcome::Committed),
            Err(TransactionError::Abort(TxnAbort::Guard(index))) => {
                self.metrics.guard_failures.fetch_add(1, Ordering::Relaxed);
                Ok(TxnOutcome::GuardFailed(index))
            }
            Err(TransactionError::Abort(TxnAbort::Corrupt(m))) => {
                Err(self.fail(format!("Transaction aborted: {}", m)))
            }
            Err(TransactionError::Storage(e)) => {
                Err(self.fail(format!("Transaction failed: {}", e)))
            }
        }
    }
}

fn apply_op(tx: &TransactionalTree, op: &Op) -> ConflictableTransactionResult<(), TxnAbort> {
    match op {
        Op::SAdd { key, member } => {
            tx.insert(composite_key(SET_PREFIX, key, member), &[] as &[u8])?;
        }
        Op::SRem { key, member } => {
            tx.remove(composite_key(SET_PREFIX, key, member))?;
        }
        Op::SAddAll { key, members, count_into } => {
            let mut added = 0i64;
            for member in members {
                if tx
                    .insert(composite_key(SET_PREFIX, key, member), &[] as &[u8])?
                    .is_none()
                {
                    added += 1;
                }
            }
            if let Some(counter) = count_into {
                if added > 0 {
                    value_incr(tx, &value_key(counter), added)?;
                }
            }
        }
        Op::HSet { key, field, value } => {
            tx.insert(composite_key(HASH_PREFIX, key, field), value.as_bytes())?;
        }
        Op::HDel { key, field } => {
            tx.remove(composite_key(HASH_PREFIX, key, field))?;
        }
        Op::HIncrBy { key, field, delta } => {
            hash_incr(tx, &composite_key(HASH_PREFIX, key, field), *delta)?;
        }
        Op::Set { key, value, ttl } => {
            let encoded = encode_value(&StoredValue::new(value.as_str(), *ttl)).map_err(abort)?;
            tx.insert(value_key(key), encoded)?;
        }
        Op::Del { key } => {
            tx.remove(value_key(key))?;
        }
        Op::IncrBy { key, delta } => {
            value_incr(tx, &value_key(key), *delta)?;
        }
        Op::SetMax { key, value } => {
            let k = value_key(key);
            let current = match tx.get(&k)? {
                Some(raw) => {
                    let stored = decode_value(&raw).map_err(abort)?;
                    Some(stored.value.parse::<u64>().map_err(|e| {
                        abort(format!("{} is not an unsigned integer: {}", key, e))
                    })?)
                }
                None => None,
            };
            if current.map_or(true, |c| *value > c) {
                let encoded =
                    encode_value(&StoredValue::new(value.to_string(), None)).map_err(abort)?;
                tx.insert(k, encoded)?;
            }
        }
    }
    Ok(())
}

fn value_incr(tx: &TransactionalTree, k: &[u8], delta: i64) -> ConflictableTransactionResult<i64, TxnAbort> {
    let now = now_millis();
    let (current, expires_at) = match tx.get(k)? {
        Some(raw) => {
            let stored = decode_value(&raw).map_err(abort)?;
            if stored.is_live(now) {
                let n = stored
                    .value
                    .parse::<i64>()
                    .map_err(|e| abort(format!("counter is not an integer: {}", e)))?;
                (n, stored.expires_at)
            } else {
                (0, None)
            }
        }
        None => (0, None),
    };
    let next = current.saturating_add(delta);
    let encoded = encode_value(&StoredValue { value: next.to_string(), expires_at }).map_err(abort)?;
    tx.insert(k, encoded)?;
    Ok(next)
}

fn hash_incr(tx: &TransactionalTree, k: &[u8], delta: i64) -> ConflictableTransactionResult<i64, TxnAbort> {
    let current = match tx.get(k)? {
        Some(raw) => utf8(&raw)
            .map_err(abort)?
            .parse::<i64>()
            .map_err(|e| abort(format!("hash field is not an integer: {}", e)))?,
        None => 0,
    };
    let next = current.saturating_add(delta);
    tx.insert(k, next.to_string().as_bytes())?;
    Ok(next)
}

fn abort(message: String) -> ConflictableTransactionError<TxnAbort> {
    ConflictableTransactionError::Abort(TxnAbort::Corrupt(message))
}

fn composite_key(prefix: &[u8], key: &str, member: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + key.len() + member.len() + 1);
    out.extend_from_slice(prefix);
    out.extend_from_slice(key.as_bytes());
    out.push(SEPARATOR);
    out.extend_from_slice(member.as_bytes());
    out
}

fn value_key(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(VALUE_PREFIX.len() + key.len());
    out.extend_from_slice(VALUE_PREFIX);
    out.extend_from_slice(key.as_bytes());
    out
}

fn encode_value(value: &StoredValue) -> Result<Vec<u8>, String> {
    bincode::serialize(value).map_err(|e| format!("Failed to encode value: {}", e))
}

fn decode_value(raw: &[u8]) -> Result<StoredValue, String> {
    bincode::deserialize(raw).map_err(|e| format!("Failed to decode value: {}", e))
}

fn utf8(raw: &[u8]) -> Result<String, String> {
    String::from_utf8(raw.to_vec()).map_err(|e| format!("Invalid UTF-8 value: {}", e))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
