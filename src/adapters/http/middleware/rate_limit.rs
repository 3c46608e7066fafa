//! Rate limiting middleware for axum.
//!
//! Every request is counted against the policy for its path before it
//! reaches a handler.
//!
//! Rate limit status is returned in standard HTTP headers:
//! - `X-RateLimit-Limit`: Maximum requests allowed in the window
//! - `X-RateLimit-Remaining`: Requests remaining in the current window
//! - `X-RateLimit-Reset`: Unix timestamp when the window resets
//! - `X-RateLimit-Policy`: Limit and window, e.g. `60;w=1h`
//! - `Retry-After`: Seconds to wait (only on 429 response)
//!
//! Requests let through because counting failed carry none of these headers.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get, middleware};
//! use std::sync::Arc;
//!
//! let limiter = Arc::new(RateLimiter::new(table, store, Arc::new(SystemClock)));
//!
//! let app = Router::new()
//!     .route("/api/resource", get(handler))
//!     .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::RateLimiter;
use crate::domain::rate_limit::{ClientPrincipal, Decision, DecisionOutcome, RequestContext};

/// Rate limiter middleware state.
pub type RateLimiterState = Arc<RateLimiter>;

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// Unix timestamp when the window resets.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
    /// Limit and window of the applied policy.
    pub static X_RATELIMIT_POLICY: HeaderName = HeaderName::from_static("x-ratelimit-policy");
}

/// Body of a 429 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitExceeded {
    pub error: &'static str,
    pub message: String,
    pub retry_after: u64,
}

/// Rate limiting middleware.
///
/// This middleware:
/// 1. Builds a request view from the path, headers, peer address and any
///    [`ClientPrincipal`] extension
/// 2. Asks the limiter for a decision
/// 3. Returns 429 Too Many Requests when denied
/// 4. Otherwise runs the handler and adds rate limit headers to its response
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let decision = {
        let principal = request.extensions().get::<ClientPrincipal>();
        let context = RequestContext::new(request.uri().path(), request.headers())
            .with_remote_addr(connect_info.map(|ci| ci.0.ip()))
            .with_principal(principal.map(|p| p.0.as_str()));

        limiter.check(&context).await
    };

    match decision.outcome {
        DecisionOutcome::Denied => {
            let retry_after = decision.retry_after_secs(limiter.now_ms());
            rate_limit_response(&decision, retry_after)
        }
        DecisionOutcome::DegradedAllowed => next.run(request).await,
        DecisionOutcome::Allowed => {
            let mut response = next.run(request).await;
            add_rate_limit_headers(response.headers_mut(), &decision);
            response
        }
    }
}

/// Create a 429 Too Many Requests response.
fn rate_limit_response(decision: &Decision, retry_after: u64) -> Response {
    let body = RateLimitExceeded {
        error: "Too Many Requests",
        message: format!(
            "Rate limit of {} requests exceeded. Try again in {} seconds.",
            decision.limit, retry_after
        ),
        retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    add_rate_limit_headers(headers, decision);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));

    response
}

/// Add rate limit headers to a response.
fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(
        headers::X_RATELIMIT_LIMIT.clone(),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        headers::X_RATELIMIT_REMAINING.clone(),
        HeaderValue::from(decision.remaining),
    );
    headers.insert(
        headers::X_RATELIMIT_RESET.clone(),
        HeaderValue::from(decision.reset_at_secs()),
    );
    if let Ok(policy) = HeaderValue::from_str(&decision.policy_descriptor) {
        headers.insert(headers::X_RATELIMIT_POLICY.clone(), policy);
    }
}
