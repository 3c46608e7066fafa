//! HTTP adapters - axum router and middleware.
//!
//! Every route except `/health` sits behind the rate limit middleware.

mod health;
pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::rate_limiter::StoreSelector;
use crate::application::RateLimiter;

pub use health::{health, not_found, ErrorResponse, HealthResponse};
pub use middleware::{rate_limit_middleware, RateLimiterState};

/// Shared state for the service's own endpoints.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub selector: StoreSelector,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, selector: StoreSelector) -> Self {
        Self { limiter, selector }
    }
}

/// Builds the service router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let limited = Router::new()
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.limiter),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .with_state(state)
        .merge(limited)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
