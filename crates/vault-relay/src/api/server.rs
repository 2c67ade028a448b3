use super::{reward_handlers, stats_handlers, voucher_handlers};
use crate::config::ApiConfig;
use crate::metrics::RelayMetrics;
use crate::receipts::TxTracker;
use crate::reward::RewardDispenser;
use crate::shutdown::CancellationToken;
use crate::store::{StateStore, StorageMetrics};
use crate::voucher::VoucherService;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use vault_types::{VaultError, VaultResult};

/// Services shared by every handler. Owned by the composition root.
pub struct AppState {
    pub vouchers: Arc<VoucherService>,
    pub rewards: Arc<RewardDispenser>,
    pub tracker: Arc<TxTracker>,
    pub store: Arc<dyn StateStore>,
    pub metrics: Arc<RelayMetrics>,
    pub storage_metrics: Option<Arc<StorageMetrics>>,
    pub started_at: Instant,
}

pub fn router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(stats_handlers::health))
        .route("/secret/verify", get(voucher_handlers::verify))
        .route("/secret/get-binding", get(voucher_handlers::get_binding))
        .route("/api/admin/check-access", get(voucher_handlers::check_access))
        .route("/relay/mint", post(voucher_handlers::mint))
        .route("/relay/save-code", post(voucher_handlers::save_code))
        .route("/relay/saved", get(voucher_handlers::saved_codes))
        .route("/relay/reward", post(reward_handlers::dispense))
        .route("/relay/referrer-stats", get(reward_handlers::referrer_stats))
        .route("/relay/tx/:hash", get(stats_handlers::tx_status))
        .route("/api/v1/stats/nft", get(stats_handlers::nft_stats))
        .route("/api/v1/stats/sales", get(stats_handlers::sales))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(RequestBodyLimitLayer::new(config.max_body_size));

    if config.cors_enabled {
        router = router.layer(cors_layer(&config.cors_origins));
    }
    router
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    CorsLayer::permissive().allow_origin(AllowOrigin::list(allowed))
}

pub struct ApiServer {
    addr: SocketAddr,
    router: Router,
}

impl ApiServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>, config: &ApiConfig) -> Self {
        Self {
            addr,
            router: router(state, config),
        }
    }

    /// Serves until `cancel` fires, then drains in-flight requests.
    pub async fn serve(self, mut cancel: CancellationToken) -> VaultResult<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| VaultError::Config(format!("Failed to bind {}: {}", self.addr, e)))?;
        info!("API server listening on {}", self.addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                info!("API server shutting down");
            })
            .await
            .map_err(|e| VaultError::Internal(format!("API server failed: {}", e)))
    }
}
