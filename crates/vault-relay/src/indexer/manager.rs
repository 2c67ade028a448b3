use super::scanner::ContractIndexer;
use crate::config::IndexerConfig;
use crate::ledger::LedgerClient;
use crate::metrics::RelayMetrics;
use crate::shutdown::CancellationToken;
use crate::store::{keys, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vault_types::{EthAddress, VaultResult};

/// Runs one [`ContractIndexer`] per tracked contract. Contracts come from
/// the static configuration and from the registry that successful mints
/// populate.
pub struct IndexerManager {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn StateStore>,
    config: IndexerConfig,
    metrics: Arc<RelayMetrics>,
    tasks: Mutex<HashMap<EthAddress, JoinHandle<()>>>,
}

impl IndexerManager {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn StateStore>,
        config: IndexerConfig,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            ledger,
            store,
            config,
            metrics,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    async fn tracked_contracts(&self) -> VaultResult<Vec<EthAddress>> {
        let mut contracts: Vec<EthAddress> =
            self.config.contracts.iter().map(|c| c.address).collect();

        for raw in self.store.smembers(keys::CONTRACT_REGISTRY).await? {
            match EthAddress::from_hex(&raw) {
                Ok(address) => contracts.push(address),
                Err(e) => warn!("Ignoring registry entry {:?}: {}", raw, e),
            }
        }
        contracts.sort();
        contracts.dedup();
        Ok(contracts)
    }

    /// Starts indexers for contracts not yet running. A task that has
    /// exited is replaced. Returns the number started.
    pub async fn sync(&self, cancel: &CancellationToken) -> VaultResult<usize> {
        let contracts = self.tracked_contracts().await?;
        let mut tasks = self.tasks.lock().await;
        let mut started = 0;

        for contract in contracts {
            if let Some(handle) = tasks.get(&contract) {
                if !handle.is_finished() {
                    continue;
                }
                warn!("Indexer for {} exited, restarting", contract);
            }

            let indexer = ContractIndexer::new(
                contract,
                self.ledger.clone(),
                self.store.clone(),
                &self.config,
                self.metrics.clone(),
            );
            let handle = tokio::spawn(indexer.run(cancel.clone()));
            tasks.insert(contract, handle);
            started += 1;
        }

        if started > 0 {
            info!("Started {} indexer(s), {} running", started, tasks.len());
        }
        Ok(started)
    }

    pub async fn running(&self) -> Vec<EthAddress> {
        let tasks = self.tasks.lock().await;
        let mut running: Vec<EthAddress> = tasks
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(address, _)| *address)
            .collect();
        running.sort();
        running
    }

    /// Polls the registry until cancelled, then waits for every indexer.
    pub async fn run(self: Arc<Self>, mut cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.registry_poll_secs.max(1)));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.sync(&cancel).await {
                        warn!("Contract registry poll failed: {}", e);
                    }
                }
            }
        }

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain().map(|(_, h)| h).collect();
        futures::future::join_all(handles).await;
        debug!("Indexer manager stopped");
    }
}
