use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::{num::NonZeroU32, sync::Arc};

use crate::{config::RateLimitSettings, error::AppError};

/// RequestThrottle
///
/// A process-wide token bucket shared by every request. It is the only mutable
/// shared state on the request path; `governor` keeps it lock-free.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl RequestThrottle {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(settings.burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// throttle_requests
///
/// Runs ahead of CORS and of the access gateway: an over-quota request is
/// answered 429 without any policy being evaluated.
pub async fn throttle_requests(
    State(throttle): State<RequestThrottle>,
    request: Request,
    next: Next,
) -> Response {
    if !throttle.try_acquire() {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        return AppError::TooManyRequests.into_response();
    }
    next.run(request).await
}
