use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    data_collector::CollectorState,
    error::AppError,
    models::{
        ClimateZone, CreateNbsRequest, CreatedResource, GeoLocation, Nbs, NbsSummary,
        PresignedUrlRequest, PresignedUrlResponse, ProfileResponse,
    },
    repository::{PageQuery, PageRequest, RepositoryState},
    responses::{ApiResponse, PageResponse},
    security::Principal,
    storage::{StorageState, object_key},
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Maps a malformed query string onto the standard 400 envelope.
fn page_request(query: Result<Query<PageQuery>, QueryRejection>) -> Result<PageRequest, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::invalid(rejection.body_text()))?;
    Ok(PageRequest::try_from(query)?)
}

// --- Catalog (public, GET only) ---

/// get_nbs_by_id
///
/// An id that is not a UUID cannot exist, so it is reported as not found.
#[utoipa::path(
    get,
    path = "/api/nbs/{id}",
    tag = "catalog",
    params(("id" = String, Path, description = "NBS id")),
    responses(
        (status = 200, description = "NBS retrieved successfully", body = ApiResponse<Nbs>),
        (status = 404, description = "No NBS with this id")
    )
)]
pub async fn get_nbs_by_id(
    State(repo): State<RepositoryState>,
    Path(id): Path<String>,
) -> ApiResult<Nbs> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::NotFound(format!("NBS with id: {id} not found in DB")))?;
    let nbs = repo.find_by_id(id).await?;
    Ok(Json(ApiResponse::success(nbs, "NBS retrieved successfully")))
}

#[utoipa::path(
    get,
    path = "/api/nbs/title/{title}",
    tag = "catalog",
    params(("title" = String, Path, description = "Exact NBS title")),
    responses(
        (status = 200, description = "NBS retrieved successfully", body = ApiResponse<Nbs>),
        (status = 404, description = "No NBS with this title")
    )
)]
pub async fn get_nbs_by_title(
    State(repo): State<RepositoryState>,
    Path(title): Path<String>,
) -> ApiResult<Nbs> {
    let nbs = repo.find_by_title(&title).await?;
    Ok(Json(ApiResponse::success(nbs, "NBS retrieved successfully")))
}

/// list_nbs
///
/// Paginated brief cards of the whole catalog, newest first by default.
#[utoipa::path(
    get,
    path = "/api/nbs/",
    tag = "catalog",
    params(PageQuery),
    responses(
        (status = 200, description = "NBSs retrieved successfully", body = ApiResponse<PageResponse<NbsSummary>>),
        (status = 400, description = "Unsupported sort field")
    )
)]
pub async fn list_nbs(
    State(repo): State<RepositoryState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<PageResponse<NbsSummary>> {
    let page = page_request(query)?;
    let results = repo.find_summaries(None, page).await?;
    Ok(Json(ApiResponse::success(results, "NBSs retrieved successfully")))
}

#[utoipa::path(
    get,
    path = "/api/nbs/zone/{climateZone}",
    tag = "catalog",
    params(
        ("climateZone" = String, Path, description = "ATLANTIC, BOREAL, CONTINENTAL or MEDITERRANEAN (any case)"),
        PageQuery
    ),
    responses(
        (status = 200, description = "NBSs of the zone retrieved successfully", body = ApiResponse<PageResponse<NbsSummary>>),
        (status = 400, description = "Unknown climate zone or sort field")
    )
)]
pub async fn list_nbs_by_zone(
    State(repo): State<RepositoryState>,
    Path(zone): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<PageResponse<NbsSummary>> {
    let zone: ClimateZone = zone.parse().map_err(|_| {
        AppError::Validation(json!({ "climateZone": format!("Invalid climate zone: {zone}") }))
    })?;
    let page = page_request(query)?;

    let results = repo.find_summaries(Some(zone), page).await?;
    Ok(Json(ApiResponse::success(
        results,
        format!("NBSs for {zone} zone retrieved successfully"),
    )))
}

#[utoipa::path(
    get,
    path = "/api/nbs/geolocations",
    tag = "catalog",
    responses((status = 200, description = "NBSs geolocations retrieved successfully", body = ApiResponse<Vec<GeoLocation>>))
)]
pub async fn get_geolocations(State(repo): State<RepositoryState>) -> ApiResult<Vec<GeoLocation>> {
    let locations = repo.find_geolocations().await?;
    Ok(Json(ApiResponse::success(
        locations,
        "NBSs geolocations retrieved successfully",
    )))
}

// --- Management (SUPER_ADMIN / ADMIN) ---

/// create_nbs
///
/// Validates the whole payload and reports every violation in one 400.
#[utoipa::path(
    post,
    path = "/api/manage/nbs",
    tag = "management",
    request_body = CreateNbsRequest,
    responses(
        (status = 201, description = "NBS created successfully", body = ApiResponse<CreatedResource>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Missing SUPER_ADMIN or ADMIN role"),
        (status = 417, description = "An NBS with this title already exists")
    ),
    security(("bearer_token" = []))
)]
pub async fn create_nbs(
    principal: Principal,
    State(repo): State<RepositoryState>,
    payload: Result<Json<CreateNbsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::invalid(rejection.body_text()))?;
    let new_nbs = payload
        .validated()
        .map_err(|errors| AppError::Validation(json!(errors)))?;

    let created = repo.create(new_nbs).await?;
    tracing::info!(id = %created.id, title = %created.title, by = %principal.subject, "NBS created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            CreatedResource { id: created.id },
            "NBS created successfully",
        )),
    ))
}

/// create_upload_url
///
/// Issues a presigned PUT for one media asset. The client uploads directly to
/// object storage, then references `resourceKey` when creating the NBS.
#[utoipa::path(
    post,
    path = "/api/manage/uploads/presigned",
    tag = "management",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "Upload URL generated", body = ApiResponse<PresignedUrlResponse>),
        (status = 400, description = "Missing title, filename or content type"),
        (status = 403, description = "Missing SUPER_ADMIN or ADMIN role")
    ),
    security(("bearer_token" = []))
)]
pub async fn create_upload_url(
    State(storage): State<StorageState>,
    payload: Result<Json<PresignedUrlRequest>, JsonRejection>,
) -> ApiResult<PresignedUrlResponse> {
    let Json(payload) = payload.map_err(|rejection| AppError::invalid(rejection.body_text()))?;
    if payload.content_type.trim().is_empty() {
        return Err(AppError::Validation(json!({ "contentType": "Content type is required" })));
    }

    let key = object_key(&payload.nbs_title, &payload.filename)
        .map_err(|e| AppError::invalid(e.to_string()))?;
    let upload_url = storage
        .presigned_upload_url(&key, payload.content_type.trim())
        .await?;

    Ok(Json(ApiResponse::success(
        PresignedUrlResponse {
            upload_url,
            resource_key: key,
        },
        "Upload URL generated successfully",
    )))
}

// --- Proxy (SUPER_ADMIN / ADMIN) ---

#[utoipa::path(
    get,
    path = "/api/proxy/datasets",
    tag = "proxy",
    responses(
        (status = 200, description = "Idra Datasets retrieved successfully", body = ApiResponse<Vec<String>>),
        (status = 500, description = "Idra unreachable or failing")
    ),
    security(("bearer_token" = []))
)]
pub async fn proxy_datasets(State(collector): State<CollectorState>) -> ApiResult<Vec<String>> {
    let ids = collector.dataset_ids().await?;
    Ok(Json(ApiResponse::success(ids, "Idra Datasets retrieved successfully")))
}

#[utoipa::path(
    get,
    path = "/api/proxy/kpis",
    tag = "proxy",
    responses(
        (status = 200, description = "KPIs retrieved successfully", body = ApiResponse<Vec<String>>),
        (status = 500, description = "KPI manager unreachable or failing")
    ),
    security(("bearer_token" = []))
)]
pub async fn proxy_kpis(State(collector): State<CollectorState>) -> ApiResult<Vec<String>> {
    let ids = collector.kpi_ids().await?;
    Ok(Json(ApiResponse::success(ids, "KPIs retrieved successfully")))
}

// --- Authenticated ---

#[utoipa::path(
    get,
    path = "/api/me",
    tag = "identity",
    responses((status = 200, description = "Caller identity", body = ApiResponse<ProfileResponse>)),
    security(("bearer_token" = []))
)]
pub async fn get_me(principal: Principal) -> ApiResult<ProfileResponse> {
    Ok(Json(ApiResponse::success(
        ProfileResponse::from(&principal),
        "Profile retrieved successfully",
    )))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "identity",
    responses((status = 200, description = "Service is up", body = String)),
    security(("bearer_token" = []))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// Unknown routes; only reached once the gateway has let the request through.
pub async fn fallback(method: Method, uri: Uri) -> AppError {
    AppError::NotFound(format!("No endpoint {method} {}", uri.path()))
}
