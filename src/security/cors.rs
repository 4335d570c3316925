use axum::http::{HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

/// CorsPolicy
///
/// The single origin allow-list applied in front of both access policies.
/// Methods are fixed, request headers are mirrored back (the credential-safe
/// form of a header wildcard), credentials are allowed and preflight results
/// are cached for 24 hours.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: Vec<HeaderValue>,
}

impl CorsPolicy {
    pub const ALLOWED_METHODS: [Method; 5] = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    pub const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(domains: &[String]) -> Self {
        let origins = domains
            .iter()
            .map(|domain| domain.trim())
            .filter(|domain| !domain.is_empty())
            .filter_map(|domain| {
                // A wildcard origin cannot be combined with credentials.
                if domain == "*" {
                    tracing::warn!("Ignoring wildcard CORS origin; list explicit domains instead");
                    return None;
                }
                HeaderValue::from_str(domain)
                    .inspect_err(|_| tracing::warn!(origin = %domain, "Ignoring invalid CORS origin"))
                    .ok()
            })
            .collect();

        Self { origins }
    }

    pub fn origins(&self) -> &[HeaderValue] {
        &self.origins
    }

    pub fn layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.origins.clone()))
            .allow_methods(Self::ALLOWED_METHODS.to_vec())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
            .max_age(Self::MAX_AGE)
    }
}
