use super::handlers::{parse_address, parse_code, parse_optional_address};
use super::responses::*;
use super::server::AppState;
use crate::reward::DispenseReceipt;
use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;
use vault_types::VaultResult;

pub async fn dispense(
    State(app): State<Arc<AppState>>,
    Json(req): Json<RewardRequest>,
) -> ApiResult<DispenseReceipt> {
    let referrer = parse_address(&req.referrer, "referrer")?;
    let recipient = parse_address(&req.recipient, "recipient")?;
    let codes = req
        .codes
        .iter()
        .map(|raw| parse_code(raw))
        .collect::<VaultResult<Vec<_>>>()?;

    let receipt = app.rewards.dispense(&referrer, &recipient, &codes).await?;
    Ok(ApiResponse::success(receipt))
}

/// One referrer's count, or the full leaderboard when no address is given.
pub async fn referrer_stats(
    State(app): State<Arc<AppState>>,
    Query(query): Query<OptionalAddressQuery>,
) -> ApiResult<ReferrerView> {
    let view = match parse_optional_address(query.address.as_deref(), "address")? {
        Some(address) => ReferrerView::One(app.rewards.referrer_stats(&address).await?),
        None => ReferrerView::Leaderboard(app.rewards.leaderboard().await?),
    };
    Ok(ApiResponse::success(view))
}
