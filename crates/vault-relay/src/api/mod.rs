//! HTTP surface: a thin axum adapter over the voucher, reward, receipt and
//! indexer services. Every body is a `{ ok, data | code + error }` envelope.

mod handlers;
mod responses;
mod reward_handlers;
mod server;
mod stats_handlers;
mod voucher_handlers;

pub use responses::{status_for, ApiError, ApiResponse, ApiResult, HealthResponse};
pub use server::{router, ApiServer, AppState};

#[cfg(test)]
mod tests;
