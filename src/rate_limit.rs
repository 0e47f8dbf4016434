//! Fixed-window request limiting backed by the key-value store.
//!
//! Counters live at `ratelimit:<namespace>:<client>`. The first request of a
//! window creates the counter and starts its TTL; every request increments it
//! atomically, and requests beyond the ceiling are rejected until the key
//! expires.
//!
//! Windows are fixed, not sliding: a client that bursts at the end of one
//! window and again at the start of the next can get up to twice the ceiling
//! through in a short span. This approximation is accepted.
//!
//! Configure via environment variables:
//! - AUTH_RATE_LIMIT_MAX (default: 5) - /auth/signup, /auth/login
//! - BILLING_RATE_LIMIT_MAX (default: 10) - /billing/create-checkout, /billing/{provider}/verify-payment
//! - RATE_LIMIT_WINDOW_SECS (default: 60)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::AppError;
use crate::store::{KeyValueStore, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u64 },
    Rejected { retry_after: Duration },
}

#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn KeyValueStore>,
    max_requests: u64,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, max_requests: u64, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub async fn check(&self, namespace: &str, client: &str) -> StoreResult<RateDecision> {
        let key = format!("ratelimit:{}:{}", namespace, client);

        let count = self.store.increment(&key).await?;
        if count == 1 {
            self.store.expire(&key, self.window).await?;
        }

        let count = count.max(0) as u64;
        if count > self.max_requests {
            return Ok(RateDecision::Rejected {
                retry_after: self.window,
            });
        }

        Ok(RateDecision::Allowed {
            remaining: self.max_requests - count,
        })
    }
}

/// Best-effort client identity: peer address, then the first
/// `x-forwarded-for` hop, then `unknown`.
pub fn client_identity(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Middleware for `axum::middleware::from_fn_with_state`, keyed by request
/// path and client identity. Allowed responses carry the ceiling and the
/// requests left in the current window.
pub async fn enforce(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_identity(&request);
    let namespace = request.uri().path().to_string();

    match limiter.check(&namespace, &client).await? {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.max_requests()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            Ok(response)
        }
        RateDecision::Rejected { retry_after } => {
            warn!(path = %namespace, %client, "rate limit exceeded");
            Err(AppError::RateLimitExceeded {
                retry_after_secs: retry_after.as_secs(),
            })
        }
    }
}
