use super::*;
use crate::config::{IndexerConfig, TrackedContract, SYSTEM_ACCOUNT};
use crate::ledger::mock::MockLedger;
use crate::ledger::{to_address, LedgerError};
use crate::shutdown::CancellationToken;
use crate::store::keys::{self, NftStatsKeys};
use crate::store::StateStore;
use crate::testing::{reader, Harness};
use ethers::types::Address;
use std::time::Duration;
use vault_types::EthAddress;

fn nft() -> EthAddress {
    EthAddress([0xc0; 20])
}

fn indexer(h: &Harness, config: &IndexerConfig) -> ContractIndexer {
    ContractIndexer::new(nft(), h.ledger.clone(), h.store.clone(), config, h.metrics.clone())
}

fn config_from(start: u64, chunk_size: u64) -> IndexerConfig {
    IndexerConfig {
        default_start_block: start,
        chunk_size,
        ..Default::default()
    }
}

async fn stats(h: &Harness) -> ContractStats {
    ContractStats::load(h.store.as_ref(), &nft()).await.unwrap()
}

#[tokio::test]
async fn test_mint_scan_is_idempotent_across_restart() {
    let h = Harness::new(1);
    let user = reader(0x42);
    h.ledger.set_head(150);
    h.ledger.push_log(MockLedger::mint_log(to_address(&nft()), to_address(&user), 120, 1, 0));

    let scanner = indexer(&h, &config_from(100, 50_000));
    let outcome = scanner.run_once().await.unwrap();
    assert_eq!(outcome.range, Some((100, 150)));
    assert_eq!(outcome.mints_seen, 1);

    let keys = NftStatsKeys::new(&nft());
    assert!(h.store.sismember(&keys.minters, &user.to_hex()).await.unwrap());
    let first = stats(&h).await;
    assert_eq!(first.minted_total, 1);
    assert_eq!(first.unique_minters, 1);
    assert_eq!(first.unique_real_users, 1);
    assert_eq!(first.last_scanned_block, Some(150));

    // Crash before the checkpoint: the same range is scanned again.
    h.store.del(&keys.last_block).await.unwrap();
    scanner.run_once().await.unwrap();
    let second = stats(&h).await;
    assert_eq!(second.minted_total, 1);
    assert_eq!(second.unique_minters, 1);
    assert_eq!(second.last_scanned_block, Some(150));
}

#[tokio::test]
async fn test_caught_up_pass_is_noop() {
    let h = Harness::new(1);
    h.ledger.set_head(10);
    let scanner = indexer(&h, &config_from(0, 50_000));

    scanner.run_once().await.unwrap();
    let outcome = scanner.run_once().await.unwrap();
    assert_eq!(outcome.range, None);
    assert_eq!(h.ledger.log_queries(), vec![(0, 10)]);
}

#[tokio::test]
async fn test_checkpoint_never_decreases() {
    let h = Harness::new(1);
    let scanner = indexer(&h, &config_from(0, 50_000));

    h.ledger.set_head(200);
    scanner.run_once().await.unwrap();
    h.ledger.set_head(180);
    assert_eq!(scanner.run_once().await.unwrap().range, None);
    assert_eq!(stats(&h).await.last_scanned_block, Some(200));

    h.ledger.set_head(260);
    assert_eq!(scanner.run_once().await.unwrap().range, Some((201, 260)));
    assert_eq!(stats(&h).await.last_scanned_block, Some(260));
}

#[tokio::test]
async fn test_failed_chunk_aborts_without_checkpoint() {
    let h = Harness::new(1);
    h.ledger.set_head(29);
    h.ledger.push_log(MockLedger::mint_log(to_address(&nft()), to_address(&reader(1)), 5, 1, 0));
    h.ledger.push_log(MockLedger::mint_log(to_address(&nft()), to_address(&reader(2)), 25, 2, 0));

    let scanner = indexer(&h, &config_from(0, 10));
    h.ledger.fail_next_logs(LedgerError::Timeout("eth_getLogs".into()));
    let err = scanner.run_once().await.unwrap_err();
    assert_eq!(err.code(), "TIMEOUT");
    let current = stats(&h).await;
    assert_eq!(current.last_scanned_block, None);
    assert_eq!(current.minted_total, 0);
    assert_eq!(h.metrics.snapshot().scans_failed, 1);

    let outcome = scanner.run_once().await.unwrap();
    assert_eq!(outcome.range, Some((0, 29)));
    assert_eq!(stats(&h).await.minted_total, 2);
    assert_eq!(h.metrics.snapshot().scans_completed, 1);
}

#[tokio::test]
async fn test_failure_mid_pass_persists_nothing() {
    let h = Harness::new(1);
    h.ledger.set_head(19);
    h.ledger.push_log(MockLedger::mint_log(to_address(&nft()), to_address(&reader(1)), 3, 1, 0));
    let scanner = indexer(&h, &config_from(0, 10));
    scanner.run_once().await.unwrap();

    h.ledger.set_head(39);
    h.ledger.push_log(MockLedger::mint_log(to_address(&nft()), to_address(&reader(2)), 22, 2, 0));
    h.ledger.fail_logs_at(30, LedgerError::Unreachable("connection refused".into()));

    // Chunk 20-29 succeeds, 30-39 fails: the mint at block 22 is not kept.
    assert_eq!(scanner.run_once().await.unwrap_err().code(), "LEDGER_UNAVAILABLE");
    let current = stats(&h).await;
    assert_eq!(current.last_scanned_block, Some(19));
    assert_eq!(current.minted_total, 1);

    assert_eq!(scanner.run_once().await.unwrap().range, Some((20, 39)));
    assert_eq!(stats(&h).await.minted_total, 2);
}

#[tokio::test]
async fn test_scan_is_chunked() {
    let h = Harness::new(1);
    h.ledger.set_head(120);
    indexer(&h, &config_from(0, 50)).run_once().await.unwrap();
    assert_eq!(h.ledger.log_queries(), vec![(0, 49), (50, 99), (100, 120)]);
}

#[tokio::test]
async fn test_reserved_account_is_not_a_real_user() {
    let h = Harness::new(1);
    h.ledger.set_head(10);
    h.ledger.push_log(MockLedger::mint_log(to_address(&nft()), to_address(&SYSTEM_ACCOUNT), 2, 1, 0));
    h.ledger.push_log(MockLedger::mint_log(to_address(&nft()), to_address(&reader(7)), 3, 2, 0));

    indexer(&h, &config_from(0, 50_000)).run_once().await.unwrap();
    let current = stats(&h).await;
    assert_eq!(current.minted_total, 2);
    assert_eq!(current.unique_minters, 2);
    assert_eq!(current.unique_real_users, 1);
}

#[tokio::test]
async fn test_plain_transfers_are_ignored() {
    let h = Harness::new(1);
    h.ledger.set_head(10);
    h.ledger.push_log(MockLedger::transfer_log(
        to_address(&nft()),
        Address::repeat_byte(0x01),
        to_address(&reader(9)),
        4,
        1,
        0,
    ));
    h.ledger.push_log(MockLedger::mint_log(to_address(&reader(0xdd)), to_address(&reader(9)), 4, 2, 0));

    indexer(&h, &config_from(0, 50_000)).run_once().await.unwrap();
    let current = stats(&h).await;
    assert_eq!(current.minted_total, 0);
    assert_eq!(current.unique_minters, 0);
    assert_eq!(current.last_scanned_block, Some(10));
}

#[tokio::test]
async fn test_repeat_mints_count_once_per_account() {
    let h = Harness::new(1);
    h.ledger.set_head(10);
    for i in 0..3u64 {
        h.ledger.push_log(MockLedger::mint_log(to_address(&nft()), to_address(&reader(5)), 2, 1, i));
    }

    indexer(&h, &config_from(0, 50_000)).run_once().await.unwrap();
    let current = stats(&h).await;
    assert_eq!(current.minted_total, 3);
    assert_eq!(current.unique_minters, 1);
}

#[tokio::test]
async fn test_configured_start_block_wins() {
    let h = Harness::new(1);
    h.ledger.set_head(1300);
    let config = IndexerConfig {
        default_start_block: 10,
        contracts: vec![TrackedContract {
            address: nft(),
            start_block: Some(1200),
        }],
        ..Default::default()
    };
    let outcome = indexer(&h, &config).run_once().await.unwrap();
    assert_eq!(outcome.range, Some((1200, 1300)));
}

#[tokio::test]
async fn test_manager_never_duplicates_indexers() {
    let h = Harness::new(1);
    let other = EthAddress([0xc1; 20]);
    h.store.sadd(keys::CONTRACT_REGISTRY, &nft().to_hex()).await.unwrap();
    h.store.sadd(keys::CONTRACT_REGISTRY, &other.to_hex()).await.unwrap();
    h.store.sadd(keys::CONTRACT_REGISTRY, "garbage").await.unwrap();

    let config = IndexerConfig {
        contracts: vec![TrackedContract {
            address: nft(),
            start_block: None,
        }],
        ..Default::default()
    };
    let manager = std::sync::Arc::new(IndexerManager::new(
        h.ledger.clone(),
        h.store.clone(),
        config,
        h.metrics.clone(),
    ));

    let (stop, cancel) = CancellationToken::new();
    assert_eq!(manager.sync(&cancel).await.unwrap(), 2);
    assert_eq!(manager.sync(&cancel).await.unwrap(), 0);
    assert_eq!(manager.running().await, vec![nft(), other]);

    let third = EthAddress([0xc2; 20]);
    h.store.sadd(keys::CONTRACT_REGISTRY, &third.to_hex()).await.unwrap();
    assert_eq!(manager.sync(&cancel).await.unwrap(), 1);

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), manager.clone().run(cancel))
        .await
        .expect("manager should stop");
    assert!(manager.running().await.is_empty());
}

#[tokio::test]
async fn test_stats_for_unscanned_contract() {
    let h = Harness::new(1);
    let current = stats(&h).await;
    assert_eq!(current.minted_total, 0);
    assert_eq!(current.unique_real_users, 0);
    assert_eq!(current.last_scanned_block, None);
}
