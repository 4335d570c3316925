use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// The catalog read endpoints. The gateway lets `GET` through anonymously and
/// answers every other method under `/api/nbs` with 403 before routing, so
/// only `GET` handlers are registered.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /api/nbs/?page=0&size=9&sort=dateCreated&direction=desc
        .route("/api/nbs", get(handlers::list_nbs))
        .route("/api/nbs/", get(handlers::list_nbs))
        // Static segment; takes precedence over `{id}`.
        .route("/api/nbs/geolocations", get(handlers::get_geolocations))
        .route("/api/nbs/title/{title}", get(handlers::get_nbs_by_title))
        .route("/api/nbs/zone/{climate_zone}", get(handlers::list_nbs_by_zone))
        .route("/api/nbs/{id}", get(handlers::get_nbs_by_id))
}
