use crate::store::{keys, StateStore};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use vault_types::{CodeHash, EthAddress, Role, VaultError, VaultResult};

/// Allow-list flags of one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    pub address: EthAddress,
    pub has_access: bool,
    pub admin: bool,
    pub publisher: bool,
    pub author: bool,
}

/// Projects roles from code classes and address allow-lists. Nothing here is
/// cached; every answer comes from the store.
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn StateStore>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Full precedence: code classes, then address allow-lists, then plain
    /// voucher validity. First match wins.
    pub async fn resolve(&self, code: Option<&CodeHash>, address: Option<&EthAddress>) -> VaultResult<Role> {
        if let Some(code) = code {
            let member = code.to_hex();
            if self.store.sismember(keys::PUBLISHER_CODES, &member).await? {
                return Ok(Role::Publisher);
            }
            if self.store.sismember(keys::AUTHOR_CODES, &member).await? {
                return Ok(Role::Author);
            }
        }

        if let Some(address) = address {
            let member = address.to_hex();
            if self.store.sismember(keys::PUBLISHERS, &member).await? {
                return Ok(Role::Publisher);
            }
            if self.store.sismember(keys::AUTHORS, &member).await? {
                return Ok(Role::Author);
            }
        }

        if let Some(code) = code {
            if self.store.sismember(keys::VALID_CODES, &code.to_hex()).await? {
                return Ok(Role::Reader);
            }
        }

        Ok(Role::Unknown)
    }

    pub async fn check_access(&self, address: &EthAddress) -> VaultResult<AccessReport> {
        let member = address.to_hex();
        let admin = self.store.sismember(keys::ADMINS, &member).await?;
        let publisher = self.store.sismember(keys::PUBLISHERS, &member).await?;
        let author = self.store.sismember(keys::AUTHORS, &member).await?;

        Ok(AccessReport {
            address: *address,
            has_access: admin || publisher || author,
            admin,
            publisher,
            author,
        })
    }

    /// Adds an account to an allow-list. Returns false if it was already there.
    pub async fn grant(&self, list: AllowList, address: &EthAddress) -> VaultResult<bool> {
        self.store.sadd(list.key(), &address.to_hex()).await
    }

    pub async fn revoke(&self, list: AllowList, address: &EthAddress) -> VaultResult<bool> {
        self.store.srem(list.key(), &address.to_hex()).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllowList {
    Admin,
    Publisher,
    Author,
}

impl AllowList {
    fn key(&self) -> &'static str {
        match self {
            AllowList::Admin => keys::ADMINS,
            AllowList::Publisher => keys::PUBLISHERS,
            AllowList::Author => keys::AUTHORS,
        }
    }
}

impl FromStr for AllowList {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(AllowList::Admin),
            "publisher" => Ok(AllowList::Publisher),
            "author" => Ok(AllowList::Author),
            other => Err(VaultError::InvalidInput(format!("Unknown allow-list: {}", other))),
        }
    }
}
