use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// Endpoints for catalog managers. `create_router` wraps this router in a
/// route layer requiring `SUPER_ADMIN` or `ADMIN`, checked after the gateway
/// has authenticated the caller, so a missing role is a 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /api/manage/nbs
        .route("/api/manage/nbs", post(handlers::create_nbs))
        // POST /api/manage/uploads/presigned
        // Short-lived PUT URL for a media asset; the upload bypasses this service.
        .route(
            "/api/manage/uploads/presigned",
            post(handlers::create_upload_url),
        )
        // GET /api/proxy/datasets, GET /api/proxy/kpis
        // Reference ids from Idra and the KPI manager, for the create form.
        .route("/api/proxy/datasets", get(handlers::proxy_datasets))
        .route("/api/proxy/kpis", get(handlers::proxy_kpis))
}
