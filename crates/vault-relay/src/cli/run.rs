use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vault_relay::api::{ApiServer, AppState};
use vault_relay::config::RelayConfig;
use vault_relay::indexer::IndexerManager;
use vault_relay::ledger::EthersLedger;
use vault_relay::metrics::RelayMetrics;
use vault_relay::receipts::TxTracker;
use vault_relay::relayer::RelayerPool;
use vault_relay::reward::RewardDispenser;
use vault_relay::shutdown::CancellationToken;
use vault_relay::store::SledStore;
use vault_relay::voucher::VoucherService;
use vault_types::{VaultError, VaultResult};

/// Composition root: every service is built here once and handed to the
/// tasks that need it.
pub async fn run_relay(config: RelayConfig) -> VaultResult<()> {
    config.validate()?;
    info!("Starting Vault Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("\n{}", config.redacted());

    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| VaultError::Config(format!("Failed to create data directory: {}", e)))?;

    let store = Arc::new(SledStore::open(&config.storage_path(), &config.storage)?);
    let storage_metrics = store.metrics();

    let ledger = Arc::new(EthersLedger::connect(&config.ledger)?);
    ledger.verify_chain(config.ledger.chain_id).await?;

    let metrics = Arc::new(RelayMetrics::new());
    let pool = Arc::new(RelayerPool::from_config(
        &config.relayers,
        config.ledger.chain_id,
        ledger.clone(),
        metrics.clone(),
    )?);
    pool.initialize().await;
    info!("Relayer pool ready with {} identities", pool.len());

    let vouchers = Arc::new(VoucherService::new(
        store.clone(),
        pool.clone(),
        config.vouchers.clone(),
        &config.ledger,
        metrics.clone(),
    )?);
    let rewards = Arc::new(RewardDispenser::new(
        store.clone(),
        pool.clone(),
        &config.rewards,
        &config.ledger,
        metrics.clone(),
    )?);
    let tracker = Arc::new(TxTracker::new(ledger.clone(), store.clone()));

    let (stop, cancel) = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(vouchers.clone().run_reconciler(cancel.clone())));
    tasks.push(tokio::spawn(pool.clone().run_balance_refresh(
        Duration::from_secs(config.relayers.balance_refresh_secs),
        cancel.clone(),
    )));

    if config.indexer.enabled {
        let manager = Arc::new(IndexerManager::new(
            ledger.clone(),
            store.clone(),
            config.indexer.clone(),
            metrics.clone(),
        ));
        tasks.push(tokio::spawn(manager.run(cancel.clone())));
        info!("Indexer manager started");
    }

    if config.api.enabled {
        let state = Arc::new(AppState {
            vouchers,
            rewards,
            tracker,
            store: store.clone(),
            metrics,
            storage_metrics: Some(storage_metrics),
            started_at: Instant::now(),
        });
        let server = ApiServer::new(config.api_socket_addr(), state, &config.api);
        let api_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(api_cancel).await {
                error!("API server error: {}", e);
            }
        }));
    }

    wait_for_shutdown().await;

    info!("Shutting down...");
    let _ = stop.send(true);
    futures::future::join_all(tasks).await;
    store.flush().await?;

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => { info!("Received SIGTERM"); }
                    _ = sigint.recv() => { info!("Received SIGINT"); }
                }
                return;
            }
            _ => warn!("Failed to install signal handlers, falling back to Ctrl+C"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}
