use super::*;
use crate::config::{ApiConfig, LedgerConfig, RewardConfig};
use crate::ledger::LedgerError;
use crate::receipts::TxTracker;
use crate::reward::RewardDispenser;
use crate::store::{keys, StateStore};
use crate::testing::{reader, voucher_config, Harness};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;
use vault_types::{EthAddress, VaultError};

fn app(h: &Harness) -> Router {
    let rewards = RewardDispenser::new(
        h.store.clone(),
        h.pool.clone(),
        &RewardConfig {
            contract: Some(EthAddress([0xee; 20])),
            ..Default::default()
        },
        &LedgerConfig::default(),
        h.metrics.clone(),
    )
    .unwrap();

    let state = Arc::new(AppState {
        vouchers: Arc::new(h.vouchers(voucher_config())),
        rewards: Arc::new(rewards),
        tracker: Arc::new(TxTracker::new(h.ledger.clone(), h.store.clone())),
        store: h.store.clone(),
        metrics: h.metrics.clone(),
        storage_metrics: Some(h.store.metrics()),
        started_at: Instant::now(),
    });
    router(state, &ApiConfig::default())
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    call(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    call(app, request).await
}

#[tokio::test]
async fn test_health_reports_relayers_and_metrics() {
    let h = Harness::new(2);
    let (status, body) = get(&app(&h), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["relayers"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["pending_redemptions"], 0);
    assert!(body["data"]["relay"]["submissions"].is_u64());
}

#[tokio::test]
async fn test_mint_then_reuse_conflicts() {
    let h = Harness::new(1);
    let app = app(&h);
    let code = h.issue_valid("WV-API0-0001").await;
    let request = json!({ "codeHash": code.to_hex(), "dest": reader(7).to_hex() });

    let (status, body) = post(&app, "/relay/mint", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let tx_hash = body["data"]["tx_hash"].as_str().unwrap().to_string();
    assert_eq!(tx_hash.len(), 66);

    let (status, body) = post(&app, "/relay/mint", request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "ALREADY_USED");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_mint_rejections() {
    let h = Harness::new(1);
    let app = app(&h);
    let code = h.issue_valid("WV-API0-0002").await;

    let unknown = json!({ "codeHash": "ab".repeat(32), "dest": reader(7).to_hex() });
    let (status, body) = post(&app, "/relay/mint", unknown).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "INVALID_CODE");

    let bad_dest = json!({ "codeHash": code.to_hex(), "dest": "0x1234" });
    let (status, body) = post(&app, "/relay/mint", bad_dest).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert!(h.is_valid(&code).await);
}

#[tokio::test]
async fn test_unconfirmed_mint_returns_hash() {
    let h = Harness::new(1);
    let app = app(&h);
    let code = h.issue_valid("WV-API0-0003").await;
    h.ledger.fail_next_send(LedgerError::Timeout("send timed out".into()));

    let request = json!({ "codeHash": code.to_hex(), "recipient": reader(8).to_hex() });
    let (status, body) = post(&app, "/relay/mint", request).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "SUBMISSION_UNCONFIRMED");
    assert!(body["txHash"].as_str().unwrap().starts_with("0x"));
}

#[tokio::test]
async fn test_verify_and_binding_never_leak_keys() {
    let h = Harness::new(1);
    let app = app(&h);
    let code = h.issue_valid("WV-API0-0004").await;

    let (status, body) = get(&app, &format!("/secret/verify?codeHash={}", code)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "VALID");
    assert_eq!(body["data"]["role"], "reader");

    let (status, body) = get(&app, &format!("/secret/get-binding?codeHash={}", code)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["generated"], true);

    let stored = h.store.hgetall(keys::READER_KEYS).await.unwrap();
    assert_eq!(stored.len(), 1);
    let text = body.to_string();
    assert!(!text.contains(&stored[0].1));
    assert!(text.contains(&stored[0].0));
}

#[tokio::test]
async fn test_check_access_requires_address() {
    let h = Harness::new(1);
    let app = app(&h);
    h.store.sadd(keys::ADMINS, &reader(3).to_hex()).await.unwrap();

    let (status, body) = get(&app, &format!("/api/admin/check-access?address={}", reader(3))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["admin"], true);

    let (status, _) = get(&app, "/api/admin/check-access?address=nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_save_and_list_codes() {
    let h = Harness::new(1);
    let app = app(&h);
    let code = h.issue_valid("WV-API0-0005").await;

    let request = json!({ "codeHash": code.to_hex(), "address": reader(4).to_hex() });
    let (status, _) = post(&app, "/relay/save-code", request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, &format!("/relay/saved?address={}", reader(4))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["codes"], json!([code.to_hex()]));
}

#[tokio::test]
async fn test_reward_dispense_and_collision() {
    let h = Harness::new(1);
    let app = app(&h);
    let mut codes = Vec::new();
    for i in 0..5 {
        codes.push(h.issue_valid(&format!("WV-API1-000{}", i)).await.to_hex());
    }

    let request = json!({
        "referrer": reader(1).to_hex(),
        "recipient": reader(2).to_hex(),
        "codes": codes,
    });
    let (status, body) = post(&app, "/relay/reward", request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["business_id"].is_string());

    codes.reverse();
    let again = json!({
        "referrer": reader(1).to_hex(),
        "dest": reader(5).to_hex(),
        "codes": codes,
    });
    let (status, body) = post(&app, "/relay/reward", again).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "BUSINESS_ID_USED");

    let (_, board) = get(&app, "/relay/referrer-stats").await;
    assert_eq!(board["data"][0]["count"], 1);
    let (_, one) = get(&app, &format!("/relay/referrer-stats?address={}", reader(1))).await;
    assert_eq!(one["data"]["count"], 1);
}

#[tokio::test]
async fn test_tx_status_and_stats() {
    let h = Harness::new(1);
    let app = app(&h);

    let (status, body) = get(&app, &format!("/relay/tx/0x{}", "11".repeat(32))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "PENDING");

    let (status, body) = get(&app, "/api/v1/stats/nft").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mintedTotal"], 0);
    assert_eq!(body["data"]["lastScannedBlock"], Value::Null);

    let (status, body) = get(&app, "/api/v1/stats/sales").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[test]
fn test_error_status_mapping() {
    assert_eq!(status_for(&VaultError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(&VaultError::AlreadyRewarded("x".into())), StatusCode::CONFLICT);
    assert_eq!(status_for(&VaultError::NotFound("x".into())), StatusCode::NOT_FOUND);
    assert_eq!(status_for(&VaultError::Busy("x".into())), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(status_for(&VaultError::NonceConflict("x".into())), StatusCode::BAD_GATEWAY);
    assert_eq!(status_for(&VaultError::Storage("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        status_for(&VaultError::SubmissionUnconfirmed {
            tx_hash: "0x1".into(),
            message: "m".into(),
        }),
        StatusCode::GATEWAY_TIMEOUT
    );
}
