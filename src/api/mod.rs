// HTTP dispatch layer around the rate limiter

pub mod client_ip;
pub mod cors;
pub mod error;
pub mod rate_limit_middleware;
pub mod request_log;

pub use client_ip::client_identity;
pub use cors::cors_layer;
pub use error::AppError;
pub use rate_limit_middleware::rate_limit;
pub use request_log::log_requests;

use crate::config::CorsConfig;
use crate::rate_limit::RateLimiter;
use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Limiter settings and load, for operators
#[derive(Serialize)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub rps: f64,
    pub burst: u32,
    pub eviction_interval_ms: u64,
    pub tracked_clients: usize,
}

/// Create the service router.
///
/// Everything under `/api/v1` passes the rate limiter; every request is logged
/// and subject to CORS.
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/rate-limit", get(rate_limit_status))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.rate_limiter),
            rate_limit,
        ));

    Router::new()
        .nest("/api/v1", api)
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
        .layer(cors_layer(cors))
}

/// GET /api/v1/health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/v1/rate-limit
async fn rate_limit_status(State(state): State<AppState>) -> Json<RateLimitStatus> {
    let limiter = &state.rate_limiter;
    Json(RateLimitStatus {
        enabled: limiter.is_enabled(),
        rps: limiter.rate(),
        burst: limiter.burst(),
        eviction_interval_ms: limiter.eviction_interval().as_millis() as u64,
        tracked_clients: limiter.client_count(),
    })
}

async fn not_found() -> AppError {
    AppError::NotFound
}
