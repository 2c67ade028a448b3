use super::*;
use crate::config::VoucherConfig;
use crate::ledger::mock::MockLedger;
use crate::ledger::{parse_hash, to_address, LedgerError};
use crate::store::{keys, StateStore};
use crate::testing::{book, reader, voucher_config, Harness};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use vault_types::{CodeClass, CodeHash, EthAddress, Role, VaultError};

#[tokio::test]
async fn test_redeem_consumes_and_relays() {
    let h = Harness::new(2);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0001-AAAA").await;

    let redemption = vouchers.redeem(&code, &reader(1), None).await.unwrap();
    assert_eq!(redemption.book, book());
    assert!(!h.is_valid(&code).await);
    assert!(h.is_used(&code).await);

    let sent = h.ledger.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(crate::ledger::hash_hex(&sent[0].hash), redemption.tx_hash);

    let binding = vouchers.load_binding(&code).await.unwrap().unwrap();
    assert_eq!(binding.address, reader(1));
    assert_eq!(binding.source, BindingSource::Redeemed);
    assert!(h
        .store
        .sismember(keys::CONTRACT_REGISTRY, &book().to_hex())
        .await
        .unwrap());
    assert!(h.store.exists(&keys::mint_tx(&redemption.tx_hash)).await.unwrap());
    assert_eq!(vouchers.daily_sales().await.unwrap()[0].sales, 1);
}

#[tokio::test]
async fn test_second_redeem_is_already_used() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0002-AAAA").await;

    vouchers.redeem(&code, &reader(1), None).await.unwrap();
    let err = vouchers.redeem(&code, &reader(2), None).await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_USED");
    assert_eq!(h.ledger.sent().len(), 1);
}

#[tokio::test]
async fn test_dropped_redeem_still_relays() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-DROP-0001").await;
    h.ledger.delay_fees(Duration::from_millis(300));

    let caller = tokio::time::timeout(Duration::from_millis(50), vouchers.redeem(&code, &reader(7), None)).await;
    assert!(caller.is_err());
    assert!(h.is_used(&code).await);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.ledger.sent().len(), 1);
    let binding = vouchers.load_binding(&code).await.unwrap().unwrap();
    assert_eq!(binding.address, reader(7));
    assert_eq!(vouchers.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_dropped_redeem_still_compensates() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-DROP-0002").await;
    h.ledger.delay_fees(Duration::from_millis(300));
    h.ledger.fail_next_send(LedgerError::Rejected("execution reverted".into()));

    let caller = tokio::time::timeout(Duration::from_millis(50), vouchers.redeem(&code, &reader(7), None)).await;
    assert!(caller.is_err());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(h.is_valid(&code).await);
    assert!(!h.is_used(&code).await);
    assert!(vouchers.load_binding(&code).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_code_is_invalid() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let err = vouchers
        .redeem(&CodeHash::of_raw("WV-NOPE-NOPE"), &reader(1), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_CODE");
    assert!(h.ledger.sent().is_empty());
}

#[tokio::test]
async fn test_concurrent_redeem_single_winner() {
    let h = Harness::new(3);
    let vouchers = Arc::new(h.vouchers(VoucherConfig {
        max_concurrent_mints: 64,
        ..voucher_config()
    }));
    let code = h.issue_valid("WV-ABCD-0000").await;

    let tasks: Vec<_> = (0..16u8)
        .map(|i| {
            let vouchers = vouchers.clone();
            tokio::spawn(async move { vouchers.redeem(&code, &reader(i + 1), None).await })
        })
        .collect();

    let mut accepted = 0;
    for result in futures::future::join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, VaultError::AlreadyUsed(_) | VaultError::InvalidCode(_))),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(h.ledger.sent().len(), 1);
}

#[tokio::test]
async fn test_failed_submission_restores_code() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0003-AAAA").await;
    h.ledger
        .fail_next_send(LedgerError::Rejected("execution reverted: already minted".into()));

    let err = vouchers.redeem(&code, &reader(1), None).await.unwrap_err();
    assert_eq!(err.code(), "REVERTED");
    assert!(h.is_valid(&code).await);
    assert!(!h.is_used(&code).await);
    assert_eq!(h.metrics.snapshot().compensations, 1);

    // The restored code is redeemable again.
    assert!(vouchers.redeem(&code, &reader(1), None).await.is_ok());
}

#[tokio::test]
async fn test_exhausted_pool_restores_code() {
    let h = Harness::new(2);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0004-AAAA").await;
    h.ledger.fail_next_send(LedgerError::Unreachable("connection refused".into()));
    h.ledger.fail_next_send(LedgerError::Unreachable("connection refused".into()));

    let err = vouchers.redeem(&code, &reader(1), None).await.unwrap_err();
    assert!(err.is_transient());
    assert!(h.is_valid(&code).await);
}

#[tokio::test]
async fn test_unconfirmed_submission_keeps_code_consumed() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0005-AAAA").await;
    h.ledger.fail_next_send(LedgerError::Timeout("eth_sendRawTransaction exceeded 10s".into()));

    let err = vouchers.redeem(&code, &reader(1), None).await.unwrap_err();
    assert_eq!(err.code(), "SUBMISSION_UNCONFIRMED");
    assert!(h.is_used(&code).await);
    assert!(!h.is_valid(&code).await);
    assert_eq!(vouchers.pending_count().await.unwrap(), 1);

    // No receipt yet: stays pending.
    let report = vouchers.reconcile_pending().await.unwrap();
    assert_eq!(report.pending, 1);
    assert!(h.is_used(&code).await);
}

#[tokio::test]
async fn test_reconcile_finalizes_mined_submission() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0006-AAAA").await;
    h.ledger.fail_next_send(LedgerError::Timeout("timed out".into()));

    let err = vouchers.redeem(&code, &reader(7), None).await.unwrap_err();
    let hash = parse_hash(err.tx_hash().unwrap()).unwrap();
    h.ledger.set_receipt(hash, MockLedger::receipt(hash, to_address(&reader(9)), 1, vec![]));

    let report = vouchers.reconcile_pending().await.unwrap();
    assert_eq!(report.finalized, 1);
    assert_eq!(vouchers.pending_count().await.unwrap(), 0);
    assert!(h.is_used(&code).await);
    let binding = vouchers.load_binding(&code).await.unwrap().unwrap();
    assert_eq!(binding.address, reader(7));
}

#[tokio::test]
async fn test_reconcile_restores_reverted_submission() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0007-AAAA").await;
    h.ledger.fail_next_send(LedgerError::Timeout("timed out".into()));

    let err = vouchers.redeem(&code, &reader(7), None).await.unwrap_err();
    let hash = parse_hash(err.tx_hash().unwrap()).unwrap();
    h.ledger.set_receipt(hash, MockLedger::receipt(hash, to_address(&reader(9)), 0, vec![]));

    let report = vouchers.reconcile_pending().await.unwrap();
    assert_eq!(report.restored, 1);
    assert!(h.is_valid(&code).await);
    assert!(!h.is_used(&code).await);
    assert_eq!(vouchers.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_busy_when_permits_exhausted() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(VoucherConfig {
        max_concurrent_mints: 1,
        ..voucher_config()
    });
    let code = h.issue_valid("WV-0008-AAAA").await;

    let permit = vouchers.mint_permits_for_test().try_acquire().unwrap();
    let err = vouchers.redeem(&code, &reader(1), None).await.unwrap_err();
    assert_eq!(err.code(), "BUSY");
    assert!(h.is_valid(&code).await);
    drop(permit);

    assert!(vouchers.redeem(&code, &reader(1), None).await.is_ok());
}

#[tokio::test]
async fn test_missing_book_rejected_without_consuming() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(VoucherConfig::default());
    let code = h.issue_valid("WV-0009-AAAA").await;

    let err = vouchers.redeem(&code, &reader(1), None).await.unwrap_err();
    assert_eq!(err.code(), "CONFIG");
    assert!(h.is_valid(&code).await);
}

#[tokio::test]
async fn test_zero_recipient_rejected() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0010-AAAA").await;

    let err = vouchers.redeem(&code, &EthAddress::zero(), None).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    assert!(h.is_valid(&code).await);
}

#[tokio::test]
async fn test_book_resolution_order() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0011-AAAA").await;

    assert_eq!(vouchers.resolve_book(&code, None).await.unwrap(), Some(book()));

    let mapped = EthAddress([0xc1; 20]);
    h.store
        .hset(keys::CODE_BOOKS, &code.to_hex(), &mapped.to_hex())
        .await
        .unwrap();
    assert_eq!(vouchers.resolve_book(&code, None).await.unwrap(), Some(mapped));

    let bound = EthAddress([0xc2; 20]);
    let binding = BindingRecord {
        address: reader(1),
        role: Role::Reader,
        book: Some(bound),
        tx_hash: None,
        source: BindingSource::Generated,
        bound_at: 0,
    };
    assert_eq!(
        vouchers.resolve_book(&code, Some(&binding)).await.unwrap(),
        Some(bound)
    );

    let redemption = vouchers.redeem(&code, &reader(1), None).await.unwrap();
    assert_eq!(redemption.book, mapped);
}

#[tokio::test]
async fn test_verify_roles_and_states() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0012-AAAA").await;

    let ok = vouchers.verify(&code, None).await.unwrap();
    assert_eq!(ok.status, VerifyStatus::Valid);
    assert_eq!(ok.role, Role::Reader);

    let publisher = CodeHash::of_raw("WV-PUBL-0001");
    h.store
        .sadd(keys::PUBLISHER_CODES, &publisher.to_hex())
        .await
        .unwrap();
    assert_eq!(vouchers.verify(&publisher, None).await.unwrap().role, Role::Publisher);

    let err = vouchers
        .verify(&CodeHash::of_raw("WV-NOPE-0000"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_CODE");

    // An allow-listed account outranks the reader class of the code.
    let listed = EthAddress([0x9b; 20]);
    h.store.sadd(keys::PUBLISHERS, &listed.to_hex()).await.unwrap();
    let v = vouchers.verify(&code, Some(&listed)).await.unwrap();
    assert_eq!(v.status, VerifyStatus::Valid);
    assert_eq!(v.role, Role::Publisher);
    assert_eq!(vouchers.verify(&code, Some(&reader(3))).await.unwrap().role, Role::Reader);

    vouchers.redeem(&code, &reader(3), None).await.unwrap();
    let owned = vouchers.verify(&code, Some(&reader(3))).await.unwrap();
    assert_eq!(owned.status, VerifyStatus::AlreadyOwned);

    let err = vouchers.verify(&code, Some(&reader(4))).await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_USED");
    let err = vouchers.verify(&code, None).await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_USED");
}

#[tokio::test]
async fn test_verify_admin_access() {
    let h = Harness::new(1);
    let admin_code = CodeHash::of_raw("WV-ADMN-0001");
    let admin = EthAddress([0xad; 20]);
    let vouchers = h.vouchers(VoucherConfig {
        admin_code: Some(admin_code),
        admin_address: Some(admin),
        ..voucher_config()
    });

    let v = vouchers.verify(&admin_code, Some(&admin)).await.unwrap();
    assert_eq!(v.status, VerifyStatus::AdminAccess);
    assert_eq!(v.role, Role::Publisher);

    // Right code, wrong account: just an unknown code.
    assert!(vouchers.verify(&admin_code, Some(&reader(1))).await.is_err());
}

#[tokio::test]
async fn test_verify_self_heals_legacy_used_code() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = CodeHash::of_raw("WV-LGCY-0001");
    h.store.sadd(keys::USED_CODES, &code.to_hex()).await.unwrap();

    let v = vouchers.verify(&code, Some(&reader(5))).await.unwrap();
    assert_eq!(v.status, VerifyStatus::AlreadyOwned);
    let binding = vouchers.load_binding(&code).await.unwrap().unwrap();
    assert_eq!(binding.source, BindingSource::SelfHealed);

    // The first presenter keeps the binding.
    let err = vouchers.verify(&code, Some(&reader(6))).await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_USED");
}

#[tokio::test]
async fn test_self_heal_disabled() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(VoucherConfig {
        self_heal_bindings: false,
        ..voucher_config()
    });
    let code = CodeHash::of_raw("WV-LGCY-0002");
    h.store.sadd(keys::USED_CODES, &code.to_hex()).await.unwrap();

    assert!(vouchers.verify(&code, Some(&reader(5))).await.is_err());
    assert!(vouchers.load_binding(&code).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_binding_generates_once_and_hides_key() {
    let h = Harness::new(1);
    let vouchers = Arc::new(h.vouchers(voucher_config()));
    let code = h.issue_valid("WV-0013-AAAA").await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let vouchers = vouchers.clone();
            tokio::spawn(async move { vouchers.get_binding(&code).await })
        })
        .collect();
    let views: Vec<BindingView> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let address = views[0].address;
    assert!(views.iter().all(|v| v.address == address));
    assert_eq!(views.iter().filter(|v| v.generated).count(), 1);
    assert_eq!(views[0].role, Role::Reader);
    assert_eq!(views[0].book_address, Some(book()));

    let stored_key = h
        .store
        .hget(keys::READER_KEYS, &address.to_hex())
        .await
        .unwrap()
        .unwrap();
    let json = serde_json::to_string(&views[0]).unwrap();
    assert!(!json.contains(&stored_key));
    assert!(!json.to_lowercase().contains("private"));
}

#[tokio::test]
async fn test_get_binding_rejects_used_and_unknown() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let code = h.issue_valid("WV-0014-AAAA").await;
    vouchers.redeem(&code, &reader(1), None).await.unwrap();
    assert_eq!(vouchers.get_binding(&code).await.unwrap_err().code(), "ALREADY_USED");

    let author = CodeHash::of_raw("WV-AUTH-0001");
    h.store.sadd(keys::AUTHOR_CODES, &author.to_hex()).await.unwrap();
    assert_eq!(vouchers.get_binding(&author).await.unwrap_err().code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_save_code_and_list() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let a = h.issue_valid("WV-SAVE-0001").await;
    let b = h.issue_valid("WV-SAVE-0002").await;

    assert_eq!(vouchers.save_code(&a, Some(&reader(1))).await.unwrap().count, 1);
    assert_eq!(vouchers.save_code(&b, Some(&reader(1))).await.unwrap().count, 2);
    assert_eq!(vouchers.save_code(&b, Some(&reader(1))).await.unwrap().count, 2);
    assert_eq!(vouchers.save_code(&a, None).await.unwrap().count, 0);

    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(vouchers.saved_codes(&reader(1)).await.unwrap(), expected);

    let err = vouchers
        .save_code(&CodeHash::of_raw("WV-NOPE-0001"), Some(&reader(1)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_CODE");
}

#[tokio::test]
async fn test_check_access_and_allow_lists() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let account = EthAddress([0x42; 20]);

    assert!(!vouchers.check_access(&account).await.unwrap().has_access);

    vouchers.roles().grant(AllowList::Author, &account).await.unwrap();
    let report = vouchers.check_access(&account).await.unwrap();
    assert!(report.has_access);
    assert!(report.author);
    assert!(!report.admin);

    assert_eq!(
        vouchers.roles().resolve(None, Some(&account)).await.unwrap(),
        Role::Author
    );
}

#[tokio::test]
async fn test_role_precedence() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let roles = vouchers.roles();
    let code = h.issue_valid("WV-ROLE-0001").await;
    let account = EthAddress([0x43; 20]);

    assert_eq!(roles.resolve(Some(&code), None).await.unwrap(), Role::Reader);

    roles.grant(AllowList::Publisher, &account).await.unwrap();
    assert_eq!(roles.resolve(Some(&code), Some(&account)).await.unwrap(), Role::Publisher);

    h.store.sadd(keys::AUTHOR_CODES, &code.to_hex()).await.unwrap();
    assert_eq!(roles.resolve(Some(&code), Some(&account)).await.unwrap(), Role::Author);

    assert_eq!(roles.resolve(None, None).await.unwrap(), Role::Unknown);
}

#[tokio::test]
async fn test_issue_codes_by_class() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    let mapped = EthAddress([0xc3; 20]);

    let readers = vouchers.issue_codes(10, CodeClass::Reader, Some(mapped)).await.unwrap();
    assert_eq!(readers.len(), 10);
    for issued in &readers {
        assert_eq!(issued.hash, CodeHash::of_raw(&issued.raw));
        assert!(h.is_valid(&issued.hash).await);
        assert_eq!(vouchers.resolve_book(&issued.hash, None).await.unwrap(), Some(mapped));
    }

    let authors = vouchers.issue_codes(3, CodeClass::Author, None).await.unwrap();
    for issued in &authors {
        assert!(!h.is_valid(&issued.hash).await);
        assert_eq!(vouchers.roles().resolve(Some(&issued.hash), None).await.unwrap(), Role::Author);
    }

    assert!(vouchers.issue_codes(0, CodeClass::Reader, None).await.is_err());
}

#[tokio::test]
async fn test_daily_sales_are_cumulative() {
    let h = Harness::new(1);
    let vouchers = h.vouchers(voucher_config());
    h.store.hincr_by(keys::DAILY_MINTS, "2026-01-02", 3).await.unwrap();
    h.store.hincr_by(keys::DAILY_MINTS, "2026-01-01", 2).await.unwrap();
    h.store.hincr_by(keys::DAILY_MINTS, "2026-01-05", 1).await.unwrap();

    let sales = vouchers.daily_sales().await.unwrap();
    let pairs: Vec<(&str, u64)> = sales.iter().map(|d| (d.date.as_str(), d.sales)).collect();
    assert_eq!(pairs, vec![("2026-01-01", 2), ("2026-01-02", 5), ("2026-01-05", 6)]);
}

proptest! {
    #[test]
    fn prop_raw_codes_have_printed_shape(seed in any::<u64>()) {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let raw = generate_raw_code(&mut rng);
        prop_assert_eq!(raw.len(), 12);
        prop_assert!(raw.starts_with("WV-"));
        prop_assert_eq!(&raw[7..8], "-");
        prop_assert!(raw[3..7].chars().chain(raw[8..].chars()).all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
