use super::handlers::parse_optional_address;
use super::responses::*;
use super::server::AppState;
use crate::indexer::ContractStats;
use crate::receipts::TxStatus;
use crate::voucher::DailySales;
use axum::extract::{Path, Query, State};
use std::sync::Arc;
use vault_types::VaultError;

pub async fn health(State(app): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let pending_redemptions = app.vouchers.pending_count().await?;
    Ok(ApiResponse::success(HealthResponse {
        healthy: true,
        uptime_secs: app.started_at.elapsed().as_secs(),
        relayers: app.vouchers.pool().status(),
        pending_redemptions,
        relay: app.metrics.snapshot(),
        storage: app.storage_metrics.as_ref().map(|m| m.snapshot()),
    }))
}

pub async fn tx_status(
    State(app): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> ApiResult<TxStatus> {
    Ok(ApiResponse::success(app.tracker.status(&hash).await?))
}

pub async fn nft_stats(
    State(app): State<Arc<AppState>>,
    Query(query): Query<ContractQuery>,
) -> ApiResult<ContractStats> {
    let contract = parse_optional_address(query.contract.as_deref(), "contract")?
        .or_else(|| app.vouchers.default_contract())
        .ok_or_else(|| VaultError::InvalidInput("No contract given and no default configured".into()))?;
    Ok(ApiResponse::success(ContractStats::load(app.store.as_ref(), &contract).await?))
}

pub async fn sales(State(app): State<Arc<AppState>>) -> ApiResult<Vec<DailySales>> {
    Ok(ApiResponse::success(app.vouchers.daily_sales().await?))
}
