#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use nbs_registry::{
    AppState, create_router,
    config::{AppConfig, LOCAL_JWT_SECRET},
    data_collector::{CollectorState, MockDataCollector},
    models::{ClimateZone, CreateNbsRequest, GeoLocation, Nbs, NbsStatus, NbsSummary, NewNbs},
    repository::{NbsRepository, PageRequest, RepositoryError, RepositoryState, SortDirection, SortField},
    responses::PageResponse,
    security::{PolicyRouter, RequestThrottle, SecurityContext, TokenVerifier},
    storage::{MockStorageService, StorageState},
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

// --- In-memory repository ---

/// Catalog repository over a vector, with the same paging and sorting
/// semantics as the Postgres implementation.
#[derive(Default)]
pub struct InMemoryRepository {
    records: Mutex<Vec<Nbs>>,
}

impl InMemoryRepository {
    pub fn with_records(records: Vec<Nbs>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl NbsRepository for InMemoryRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Nbs, RepositoryError> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|nbs| nbs.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("NBS with id: {id} not found in DB")))
    }

    async fn find_by_title(&self, title: &str) -> Result<Nbs, RepositoryError> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|nbs| nbs.title == title)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("NBS with title: {title} not found in DB")))
    }

    async fn find_summaries(
        &self,
        zone: Option<ClimateZone>,
        page: PageRequest,
    ) -> Result<PageResponse<NbsSummary>, RepositoryError> {
        let mut matching: Vec<Nbs> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|nbs| zone.is_none_or(|zone| nbs.climate_zone == zone))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering = match page.sort {
                SortField::DateCreated => a.date_created.cmp(&b.date_created),
                SortField::Title => a.title.cmp(&b.title),
                SortField::ClimateZone => a.climate_zone.name().cmp(b.climate_zone.name()),
                SortField::Pilot => a.pilot.cmp(&b.pilot),
            };
            let ordering = match page.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            ordering.then(a.id.cmp(&b.id))
        });

        let total = matching.len() as u64;
        let results = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .map(NbsSummary::from)
            .collect();
        Ok(PageResponse::new(results, total, page.page, page.size))
    }

    async fn find_geolocations(&self) -> Result<Vec<GeoLocation>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|nbs| nbs.geo_location.clone())
            .collect())
    }

    async fn create(&self, nbs: NewNbs) -> Result<Nbs, RepositoryError> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|existing| existing.title == nbs.title) {
            return Err(RepositoryError::Duplicate(format!(
                "NBS with title: {} already exists",
                nbs.title
            )));
        }
        let created = nbs.into_nbs(Uuid::new_v4(), Utc::now());
        records.push(created.clone());
        Ok(created)
    }
}

// --- Fixtures ---

/// A create request that passes validation.
pub fn valid_request(title: &str) -> CreateNbsRequest {
    CreateNbsRequest {
        title: title.to_string(),
        climate_zone: Some(ClimateZone::Mediterranean),
        geo_location: Some(GeoLocation {
            latitude: 41.3874,
            longitude: 2.1686,
            address: Some("Barcelona, Spain".to_string()),
        }),
        status: Some(NbsStatus::UnderImplementation),
        pilot: "Barcelona".to_string(),
        is_urbreath_nbs: true,
        related_material: vec!["https://example.org/report.pdf".to_string()],
        area_characterization: "Dense urban district".to_string(),
        objective: "Reduce heat island effect".to_string(),
        challenges: "Roof load limits".to_string(),
        potential_impacts_and_benefits: "Lower surface temperatures".to_string(),
        lessons_learnt: "Engage residents early".to_string(),
        keywords: vec!["green roof".to_string()],
        problems: vec!["urban heat".to_string()],
        main_image: "green-roofs_main.jpg".to_string(),
        images: vec![],
        videos: vec![],
        idra_datasets: vec!["dataset-1".to_string()],
        kpis: vec!["kpi-1".to_string()],
    }
}

pub fn sample_nbs(title: &str, zone: ClimateZone, date_created: DateTime<Utc>) -> Nbs {
    let mut request = valid_request(title);
    request.climate_zone = Some(zone);
    request
        .validated()
        .expect("fixture must be valid")
        .into_nbs(Uuid::new_v4(), date_created)
}

/// `count` records, one day apart, oldest first, cycling through the climate zones.
pub fn catalog(count: usize) -> Vec<Nbs> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            sample_nbs(
                &format!("NBS {i:02}"),
                ClimateZone::ALL[i % ClimateZone::ALL.len()],
                start + Duration::days(i as i64),
            )
        })
        .collect()
}

// --- Tokens ---

pub fn mint_token(claims: Value) -> String {
    mint_token_with_secret(claims, LOCAL_JWT_SECRET)
}

pub fn mint_token_with_secret(mut claims: Value, secret: &str) -> String {
    if claims.get("exp").is_none() {
        claims["exp"] = json!(Utc::now().timestamp() + 3600);
    }
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encoding")
}

pub fn token_with_realm_roles(roles: &[&str]) -> String {
    mint_token(json!({
        "sub": "2f4c1f7e-0000-4000-8000-000000000001",
        "preferred_username": "jdoe",
        "realm_access": { "roles": roles },
    }))
}

pub fn manager_token() -> String {
    token_with_realm_roles(&["ADMIN"])
}

pub fn viewer_token() -> String {
    token_with_realm_roles(&["USER"])
}

/// Expired well beyond the default validation leeway.
pub fn expired_token() -> String {
    mint_token(json!({
        "sub": "expired-user",
        "realm_access": { "roles": ["ADMIN"] },
        "exp": Utc::now().timestamp() - 3600,
    }))
}

// --- Application ---

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
}

pub fn state_with(
    repo: Arc<InMemoryRepository>,
    storage: StorageState,
    collector: CollectorState,
    config: AppConfig,
) -> AppState {
    let verifier = TokenVerifier::from_secret(LOCAL_JWT_SECRET);
    let security = Arc::new(SecurityContext::new(PolicyRouter::standard(), verifier));
    let throttle = RequestThrottle::new(&config.rate_limit);

    AppState {
        repo: repo as RepositoryState,
        storage,
        collector,
        config,
        security,
        throttle,
    }
}

pub fn app_with(
    records: Vec<Nbs>,
    storage: MockStorageService,
    collector: MockDataCollector,
    config: AppConfig,
) -> TestApp {
    let repo = Arc::new(InMemoryRepository::with_records(records));
    let state = state_with(repo.clone(), Arc::new(storage), Arc::new(collector), config);
    TestApp {
        router: create_router(state),
        repo,
    }
}

pub fn test_app(records: Vec<Nbs>) -> TestApp {
    app_with(
        records,
        MockStorageService::new(),
        MockDataCollector::with_ids(&["dataset-1", "dataset-2"], &["kpi-1"]),
        AppConfig::default(),
    )
}

// --- Requests ---

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub raw: String,
}

impl TestResponse {
    /// The body as JSON, or `Value::Null` when it is empty or not JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.raw).unwrap_or(Value::Null)
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        raw: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}
