pub mod config;
mod error;
mod routes;
pub mod validation;

use axum::{Router, http::StatusCode, routing::get};
use gamewatch_core::{Aggregator, Prober, SnapshotHolder, StatusCache, StatusQuery};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use error::{AppError, ErrorResponse};

pub struct AppState {
    pub aggregator: Aggregator,
    pub snapshot: SnapshotHolder,
    pub max_addresses_per_request: usize,
}

impl AppState {
    /// Wire the cache, prober and aggregator for `query` from the configuration.
    pub fn new(config: &config::Config, query: Arc<dyn StatusQuery>) -> Self {
        let cache = Arc::new(StatusCache::new(config.cache_config()));
        let prober = Arc::new(Prober::new(query, config.timeout_config()));
        Self {
            aggregator: Aggregator::new(cache, prober, config.max_concurrent_probes),
            snapshot: SnapshotHolder::new(),
            max_addresses_per_request: config.max_addresses_per_request,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second per client IP
    pub per_sec: u64,
    /// Burst size per client IP
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_sec: 10,
            burst: 20,
        }
    }
}

/// Create the application router with the given state and configuration
pub fn create_app(
    state: AppState,
    request_timeout: Duration,
    rate_limit: Option<RateLimitConfig>,
) -> Router {
    let state = Arc::new(state);

    // Everything under `/` is limited: snapshot reads and on-demand lookups alike
    let mut status_routes = Router::new().route("/", get(routes::status));
    if let Some(rate_limit) = rate_limit {
        let governor = GovernorConfigBuilder::default()
            .per_second(rate_limit.per_sec)
            .burst_size(rate_limit.burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish();
        match governor {
            Some(governor) => status_routes = status_routes.layer(GovernorLayer::new(governor)),
            None => tracing::warn!(?rate_limit, "invalid rate limit, serving without one"),
        }
    }

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(status_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
