use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

pub mod config;
pub mod data_collector;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod responses;
pub mod security;
pub mod storage;

pub mod routes;
use routes::{admin, authenticated, public};

pub use config::AppConfig;
pub use data_collector::{CollectorState, HttpDataCollector, MockDataCollector};
pub use error::AppError;
pub use repository::{PostgresRepository, RepositoryState};
pub use security::{RequestThrottle, SecurityContext, SecurityState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

use security::{CorsPolicy, MANAGER_ROLES, access_gateway, require_any_role, throttle_requests};

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json` and rendered by the
/// Swagger UI. Both sit behind the secured policy.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "NBS Registry API",
        description = "Catalog of Nature-Based Solutions"
    ),
    paths(
        handlers::get_nbs_by_id, handlers::get_nbs_by_title, handlers::list_nbs,
        handlers::list_nbs_by_zone, handlers::get_geolocations, handlers::create_nbs,
        handlers::create_upload_url, handlers::proxy_datasets, handlers::proxy_kpis,
        handlers::get_me, handlers::health
    ),
    components(
        schemas(
            models::Nbs, models::NbsSummary, models::GeoLocation, models::ClimateZone,
            models::NbsStatus, models::CreateNbsRequest, models::CreatedResource,
            models::PresignedUrlRequest, models::PresignedUrlResponse, models::ProfileResponse,
        )
    ),
    tags(
        (name = "catalog", description = "Anonymous, read-only catalog"),
        (name = "management", description = "Catalog management (SUPER_ADMIN, ADMIN)"),
        (name = "proxy", description = "Upstream data services (SUPER_ADMIN, ADMIN)"),
        (name = "identity", description = "Caller identity and service health")
    ),
    modifiers(&BearerTokenAddon)
)]
pub struct ApiDoc;

struct BearerTokenAddon;

impl Modify for BearerTokenAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

/// AppState
///
/// Shared, read-only services for every request. Handlers pull out only the
/// piece they need through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub collector: CollectorState,
    pub config: AppConfig,
    /// Policy router, token verifier and unauthorized responder.
    pub security: SecurityState,
    /// Process-wide rate limiter; the only mutable shared state.
    pub throttle: RequestThrottle,
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for CollectorState {
    fn from_ref(app_state: &AppState) -> CollectorState {
        app_state.collector.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for SecurityState {
    fn from_ref(app_state: &AppState) -> SecurityState {
        app_state.security.clone()
    }
}

/// create_router
///
/// Assembles routes and middleware. Layers added later wrap the earlier ones,
/// so a request meets them bottom-up: request id and tracing, the rate
/// limiter, CORS, then the access gateway. The fallback is registered before
/// the layers so unknown paths are still gated.
pub fn create_router(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");
    let cors = CorsPolicy::new(&state.config.cors_domains).layer();

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                MANAGER_ROLES,
                require_any_role,
            )),
        )
        .fallback(handlers::fallback)
        .with_state(state.clone());

    app.layer(middleware::from_fn_with_state(
        state.security.clone(),
        access_gateway,
    ))
    .layer(cors)
    .layer(middleware::from_fn_with_state(
        state.throttle.clone(),
        throttle_requests,
    ))
    .layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// One span per request, carrying the generated `x-request-id` so every log
/// line of the request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
