//! Rate limiting for credential endpoints.
//!
//! Token bucket per client IP, to slow down password guessing and signup
//! spam. Quotas are part of the server configuration so tests and unusual
//! deployments can inject their own.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Per-IP keyed rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for the credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login attempts
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for account registration
    pub register: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Production quotas: login 1/s with a burst of 5, registration 3/min.
    pub fn new() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(NonZeroU32::new(1).unwrap())
                    .allow_burst(NonZeroU32::new(5).unwrap()),
            )),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(3).unwrap(),
            ))),
        }
    }

    /// Effectively unlimited quotas, for tests that hammer the endpoints.
    pub fn relaxed() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_second(
                NonZeroU32::new(1000).unwrap(),
            ))),
            register: Arc::new(RateLimiter::keyed(Quota::per_second(
                NonZeroU32::new(1000).unwrap(),
            ))),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the client IP: the first X-Forwarded-For entry when running
/// behind a proxy, the socket peer address otherwise.
fn client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded_for) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(first_ip) = value.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

fn check(limiter: &IpLimiter, request: &Request, exhausted: &'static str) -> Result<(), Response> {
    let ip = client_ip(request).ok_or_else(|| {
        (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response()
    })?;

    limiter
        .check_key(&ip)
        .map_err(|_| (StatusCode::TOO_MANY_REQUESTS, exhausted).into_response())
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.login,
        &request,
        "Too many login attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting account registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.register,
        &request,
        "Too many signup attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
