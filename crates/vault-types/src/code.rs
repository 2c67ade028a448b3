use crate::error::{VaultError, VaultResult};
use crate::CODE_HASH_SIZE;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Number of distinct codes that make up one referral reward.
pub const REWARD_GROUP_SIZE: usize = 5;

/// Hash of a printed voucher code. Only the hash is ever stored or transmitted.
///
/// Canonical text form is 64 lowercase hex characters without a `0x` prefix;
/// parsing accepts either case and an optional prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeHash(pub [u8; CODE_HASH_SIZE]);

impl CodeHash {
    pub fn parse(s: &str) -> VaultResult<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if s.len() != CODE_HASH_SIZE * 2 {
            return Err(VaultError::InvalidInput(format!(
                "Code hash must be {} hex characters, got {}",
                CODE_HASH_SIZE * 2,
                s.len()
            )));
        }
        let bytes = hex::decode(s)
            .map_err(|e| VaultError::InvalidInput(format!("Invalid code hash: {}", e)))?;
        let mut arr = [0u8; CODE_HASH_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Hash of a raw printed code such as `WV-AB12-CD34`.
    pub fn of_raw(raw: &str) -> Self {
        let digest = Sha256::digest(raw.trim().as_bytes());
        let mut arr = [0u8; CODE_HASH_SIZE];
        arr.copy_from_slice(&digest);
        Self(arr)
    }

    pub fn as_bytes(&self) -> &[u8; CODE_HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for CodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeHash({})", self.to_hex())
    }
}

impl fmt::Display for CodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for CodeHash {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CodeHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CodeHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
