use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Any caller holding a valid bearer token. The principal resolved by the
/// gateway is available to handlers as an extractor.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /api/me
        .route("/api/me", get(handlers::get_me))
        // GET /health
        // No anonymous exemption; monitoring calls it with a service token.
        .route("/health", get(handlers::health))
}
