use crate::metrics::RelayMetricsSnapshot;
use crate::relayer::IdentityStatus;
use crate::reward::ReferrerStats;
use crate::store::StorageMetricsSnapshot;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;
use vault_types::VaultError;

/// Envelope of every response body.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data: Some(data),
            code: None,
            error: None,
            tx_hash: None,
        })
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub struct ApiError(pub VaultError);

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        ApiError(err)
    }
}

/// Client-caused rejections map to 4xx, transient backend failures to 5xx.
pub fn status_for(err: &VaultError) -> StatusCode {
    match err {
        VaultError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        VaultError::InvalidCode(_) => StatusCode::FORBIDDEN,
        VaultError::AlreadyUsed(_)
        | VaultError::AlreadyRewarded(_)
        | VaultError::BusinessIdCollision(_)
        | VaultError::CodeAlreadyClaimed(_) => StatusCode::CONFLICT,
        VaultError::NotFound(_) => StatusCode::NOT_FOUND,
        VaultError::Busy(_) | VaultError::NoFundedRelayer(_) => StatusCode::SERVICE_UNAVAILABLE,
        VaultError::LedgerUnavailable(_)
        | VaultError::Reverted(_)
        | VaultError::InsufficientGas(_)
        | VaultError::NonceConflict(_) => StatusCode::BAD_GATEWAY,
        VaultError::Timeout(_) | VaultError::SubmissionUnconfirmed { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        VaultError::Storage(_) | VaultError::Config(_) | VaultError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let body: ApiResponse<()> = ApiResponse {
            ok: false,
            data: None,
            code: Some(self.0.code()),
            error: Some(self.0.to_string()),
            tx_hash: self.0.tx_hash().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub relayers: Vec<IdentityStatus>,
    pub pending_redemptions: usize,
    pub relay: RelayMetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageMetricsSnapshot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeQuery {
    pub code_hash: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct AddressQuery {
    pub address: String,
}

#[derive(Deserialize)]
pub struct OptionalAddressQuery {
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct ContractQuery {
    #[serde(default)]
    pub contract: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub code_hash: String,
    #[serde(alias = "recipient")]
    pub dest: String,
    #[serde(default)]
    pub book_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCodeRequest {
    pub code_hash: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct RewardRequest {
    pub referrer: String,
    #[serde(alias = "dest")]
    pub recipient: String,
    pub codes: Vec<String>,
}

#[derive(Serialize)]
pub struct SavedCodesResponse {
    pub address: String,
    pub codes: Vec<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum ReferrerView {
    One(ReferrerStats),
    Leaderboard(Vec<ReferrerStats>),
}
