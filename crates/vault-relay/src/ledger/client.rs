use super::{LedgerClient, LedgerError, LedgerResult, SignedTx};
use crate::config::LedgerConfig;
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{
    Address, BlockId, BlockNumber, Filter, Log, TransactionReceipt, H256, U256,
};
use std::error::Error as _;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, info, warn};
use vault_types::{VaultError, VaultResult};

/// [`LedgerClient`] over a JSON-RPC HTTP endpoint.
pub struct EthersLedger {
    provider: Provider<Http>,
    rpc_url: String,
    timeout: Duration,
}

impl EthersLedger {
    pub fn connect(config: &LedgerConfig) -> VaultResult<Self> {
        info!("Connecting to RPC: {}", config.rpc_url);

        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| VaultError::Config(format!("Failed to create provider: {}", e)))?;

        Ok(Self {
            provider,
            rpc_url: config.rpc_url.clone(),
            timeout: config.request_timeout(),
        })
    }

    /// Fails when the endpoint serves a different chain than configured.
    pub async fn verify_chain(&self, expected: u64) -> VaultResult<()> {
        let actual = self.chain_id().await?;
        if actual != expected {
            return Err(VaultError::Config(format!(
                "Chain ID mismatch: expected {}, got {}",
                expected, actual
            )));
        }
        info!("Connected to chain {} via {}", actual, self.rpc_url);
        Ok(())
    }

    async fn call<T, F>(&self, what: &str, fut: F) -> LedgerResult<T>
    where
        F: Future<Output = Result<T, ProviderError>> + Send,
    {
        self.call_with(what, fut, classify_provider_error).await
    }

    async fn call_with<T, F>(
        &self,
        what: &str,
        fut: F,
        classify: fn(&ProviderError) -> LedgerError,
    ) -> LedgerResult<T>
    where
        F: Future<Output = Result<T, ProviderError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = classify(&e);
                debug!("{} failed: {}", what, err);
                Err(err)
            }
            Err(_) => Err(LedgerError::Timeout(format!(
                "{} exceeded {}s",
                what,
                self.timeout.as_secs()
            ))),
        }
    }
}

pub(super) fn classify_provider_error(err: &ProviderError) -> LedgerError {
    if let Some(response) = err.as_error_response() {
        return LedgerError::classify(&response.message);
    }
    if let Some(serde_err) = err.as_serde_error() {
        return LedgerError::Malformed(serde_err.to_string());
    }
    match err {
        ProviderError::SerdeJson(e) => LedgerError::Malformed(e.to_string()),
        other => LedgerError::Unreachable(other.to_string()),
    }
}

/// Like [`classify_provider_error`], but for a broadcast: once the request
/// may have been written, a transport failure says nothing about whether the
/// node took the transaction. Only a failure to connect is definitive.
pub(super) fn classify_send_error(err: &ProviderError) -> LedgerError {
    match classify_provider_error(err) {
        LedgerError::Unreachable(message) if !is_connect_failure(err) => {
            LedgerError::Malformed(format!("transport failed during broadcast: {}", message))
        }
        other => other,
    }
}

fn is_connect_failure(err: &ProviderError) -> bool {
    let (text, mut source) = match err {
        ProviderError::JsonRpcClientError(inner) => (inner.to_string(), inner.as_ref().source()),
        other => (other.to_string(), other.source()),
    };
    if mentions_connect(&text) {
        return true;
    }

    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable
            ) {
                return true;
            }
        }
        if mentions_connect(&e.to_string()) {
            return true;
        }
        source = e.source();
    }
    false
}

fn mentions_connect(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("error trying to connect")
        || lower.contains("connection refused")
        || lower.contains("dns error")
}

#[async_trait]
impl LedgerClient for EthersLedger {
    async fn chain_id(&self) -> LedgerResult<u64> {
        let id = self.call("eth_chainId", self.provider.get_chainid()).await?;
        Ok(id.as_u64())
    }

    async fn pending_nonce(&self, address: Address) -> LedgerResult<U256> {
        self.call(
            "eth_getTransactionCount",
            self.provider
                .get_transaction_count(address, Some(BlockId::Number(BlockNumber::Pending))),
        )
        .await
    }

    async fn fee_price(&self) -> LedgerResult<U256> {
        self.call("eth_gasPrice", self.provider.get_gas_price()).await
    }

    async fn balance(&self, address: Address) -> LedgerResult<U256> {
        self.call("eth_getBalance", self.provider.get_balance(address, None))
            .await
    }

    async fn send_transaction(&self, tx: &SignedTx) -> LedgerResult<H256> {
        let sent = self
            .call_with(
                "eth_sendRawTransaction",
                async {
                    self.provider
                        .send_raw_transaction(tx.raw.clone())
                        .await
                        .map(|pending| pending.tx_hash())
                },
                classify_send_error,
            )
            .await;

        match sent {
            Ok(hash) => {
                if hash != tx.hash {
                    warn!("Node reported tx hash {:?}, computed {:?}", hash, tx.hash);
                }
                Ok(tx.hash)
            }
            Err(LedgerError::AlreadyKnown) => {
                debug!("Transaction {:?} already known to node", tx.hash);
                Ok(tx.hash)
            }
            Err(e) => Err(e),
        }
    }

    async fn receipt(&self, hash: H256) -> LedgerResult<Option<TransactionReceipt>> {
        self.call(
            "eth_getTransactionReceipt",
            self.provider.get_transaction_receipt(hash),
        )
        .await
    }

    async fn filter_logs(
        &self,
        contract: Address,
        topic: H256,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<Log>> {
        let filter = Filter::new()
            .address(contract)
            .topic0(topic)
            .from_block(from_block)
            .to_block(to_block);

        self.call("eth_getLogs", self.provider.get_logs(&filter)).await
    }

    async fn block_height(&self) -> LedgerResult<u64> {
        let height = self
            .call("eth_blockNumber", self.provider.get_block_number())
            .await?;
        Ok(height.as_u64())
    }
}
