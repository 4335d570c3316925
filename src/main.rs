use nbs_registry::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    data_collector::{CollectorState, HttpDataCollector},
    repository::{PostgresRepository, RepositoryState},
    security::{PolicyRouter, RequestThrottle, SecurityContext, TokenVerifier},
    storage::{S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, then builds every shared service
/// before serving. Any start-up failure aborts the process.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    init_tracing(config.env);

    tracing::info!(env = ?config.env, "NBS registry starting");

    // Database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // Object storage
    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
    );

    // Local MinIO starts empty.
    if config.env == Env::Local {
        if let Err(e) = s3_client.ensure_bucket_exists().await {
            tracing::warn!(error = %e, "Could not provision the local bucket");
        }
    }
    let storage = Arc::new(s3_client) as StorageState;

    // Upstream data services
    let collector = HttpDataCollector::new(&config.idra_url, &config.kpi_manager_url)
        .expect("FATAL: Failed to build the upstream HTTP client.");
    let collector = Arc::new(collector) as CollectorState;

    // Access control
    let verifier = TokenVerifier::from_key_source(&config.jwt_key_source, config.jwt_issuer.clone())
        .await
        .expect("FATAL: Failed to load token verification keys.");
    let security = Arc::new(SecurityContext::new(PolicyRouter::standard(), verifier));
    let throttle = RequestThrottle::new(&config.rate_limit);

    let port = config.port;
    let app_state = AppState {
        repo,
        storage,
        collector,
        config,
        security,
        throttle,
    };

    let app = create_router(app_state);

    let address = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&address)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {address}");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}

/// Human-readable output locally, one JSON object per line in production.
/// `RUST_LOG` overrides the default filter.
fn init_tracing(env: Env) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nbs_registry=debug,tower_http=info,axum=trace".into());

    let (pretty, json) = match env {
        Env::Local => (Some(fmt::layer().pretty()), None),
        Env::Production => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}
