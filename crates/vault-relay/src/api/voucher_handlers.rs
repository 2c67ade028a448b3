use super::handlers::{parse_address, parse_code, parse_optional_address};
use super::responses::*;
use super::server::AppState;
use crate::voucher::{AccessReport, BindingView, Redemption, SavedCode, Verification};
use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;
use tracing::debug;

pub async fn verify(
    State(app): State<Arc<AppState>>,
    Query(query): Query<CodeQuery>,
) -> ApiResult<Verification> {
    let code = parse_code(&query.code_hash)?;
    let address = parse_optional_address(query.address.as_deref(), "address")?;
    let verification = app.vouchers.verify(&code, address.as_ref()).await?;
    Ok(ApiResponse::success(verification))
}

pub async fn get_binding(
    State(app): State<Arc<AppState>>,
    Query(query): Query<CodeQuery>,
) -> ApiResult<BindingView> {
    let code = parse_code(&query.code_hash)?;
    Ok(ApiResponse::success(app.vouchers.get_binding(&code).await?))
}

pub async fn check_access(
    State(app): State<Arc<AppState>>,
    Query(query): Query<AddressQuery>,
) -> ApiResult<AccessReport> {
    let address = parse_address(&query.address, "address")?;
    Ok(ApiResponse::success(app.vouchers.check_access(&address).await?))
}

pub async fn mint(
    State(app): State<Arc<AppState>>,
    Json(req): Json<MintRequest>,
) -> ApiResult<Redemption> {
    let code = parse_code(&req.code_hash)?;
    let recipient = parse_address(&req.dest, "dest")?;
    let book = parse_optional_address(req.book_address.as_deref(), "bookAddress")?;
    debug!("Mint request for {} to {}", code, recipient);

    let redemption = app.vouchers.redeem(&code, &recipient, book).await?;
    Ok(ApiResponse::success(redemption))
}

pub async fn save_code(
    State(app): State<Arc<AppState>>,
    Json(req): Json<SaveCodeRequest>,
) -> ApiResult<SavedCode> {
    let code = parse_code(&req.code_hash)?;
    let address = parse_optional_address(req.address.as_deref(), "address")?;
    Ok(ApiResponse::success(app.vouchers.save_code(&code, address.as_ref()).await?))
}

pub async fn saved_codes(
    State(app): State<Arc<AppState>>,
    Query(query): Query<AddressQuery>,
) -> ApiResult<SavedCodesResponse> {
    let address = parse_address(&query.address, "address")?;
    let codes = app.vouchers.saved_codes(&address).await?;
    Ok(ApiResponse::success(SavedCodesResponse {
        address: address.to_hex(),
        codes: codes.iter().map(|c| c.to_hex()).collect(),
    }))
}
