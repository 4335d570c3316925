mod common;

use axum::http::{Method, StatusCode};
use common::*;
use nbs_registry::{
    config::AppConfig,
    data_collector::MockDataCollector,
    models::ClimateZone,
    storage::MockStorageService,
};
use serde_json::{Value, json};

fn titles(page: &Value) -> Vec<String> {
    page["results"]
        .as_array()
        .expect("results array")
        .iter()
        .map(|summary| summary["title"].as_str().unwrap().to_string())
        .collect()
}

// --- Listing ---

#[tokio::test]
async fn list_defaults_to_first_page_of_nine_newest_first() {
    let app = test_app(catalog(12));

    let response = send(&app.router, request(Method::GET, "/api/nbs/", None, None)).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["message"], "NBSs retrieved successfully");
    let page = &body["data"];
    assert_eq!(page["totalElements"], 12);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["lastPage"], false);
    let titles = titles(page);
    assert_eq!(titles.len(), 9);
    assert_eq!(titles[0], "NBS 11");
    assert_eq!(titles[8], "NBS 03");
}

#[tokio::test]
async fn second_page_is_the_last_page() {
    let app = test_app(catalog(12));

    let response = send(&app.router, request(Method::GET, "/api/nbs/?page=1", None, None)).await;

    let page = &response.json()["data"];
    assert_eq!(titles(page), vec!["NBS 02", "NBS 01", "NBS 00"]);
    assert_eq!(page["lastPage"], true);
}

#[tokio::test]
async fn list_without_trailing_slash_is_the_same_listing() {
    let app = test_app(catalog(2));

    let response = send(&app.router, request(Method::GET, "/api/nbs", None, None)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["data"]["totalElements"], 2);
}

#[tokio::test]
async fn summaries_carry_only_brief_fields() {
    let app = test_app(catalog(1));

    let response = send(&app.router, request(Method::GET, "/api/nbs/", None, None)).await;

    let summary = response.json()["data"]["results"][0].clone();
    let mut keys: Vec<&str> = summary.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "climateZone", "geoLocation", "id", "isUrBreathNbs", "keywords", "mainImage",
            "objective", "pilot", "title"
        ]
    );
}

#[tokio::test]
async fn sort_by_title_ascending() {
    let app = test_app(catalog(4));

    let response = send(
        &app.router,
        request(Method::GET, "/api/nbs/?sort=title&direction=ASC&size=2", None, None),
    )
    .await;

    let page = &response.json()["data"];
    assert_eq!(titles(page), vec!["NBS 00", "NBS 01"]);
    assert_eq!(page["totalPages"], 2);
}

#[tokio::test]
async fn unknown_direction_falls_back_to_descending() {
    let app = test_app(catalog(3));

    let response = send(
        &app.router,
        request(Method::GET, "/api/nbs/?sort=title&direction=sideways", None, None),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(titles(&response.json()["data"]), vec!["NBS 02", "NBS 01", "NBS 00"]);
}

#[tokio::test]
async fn unsupported_sort_field_is_a_bad_request() {
    let app = test_app(catalog(3));

    let response = send(&app.router, request(Method::GET, "/api/nbs/?sort=password", None, None)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"], "Unsupported sort field: password");
}

#[tokio::test]
async fn malformed_page_number_is_a_bad_request() {
    let app = test_app(catalog(3));

    let response = send(&app.router, request(Method::GET, "/api/nbs/?page=-1", None, None)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["message"], "Validation failed");
}

#[tokio::test]
async fn page_past_the_end_is_empty() {
    let app = test_app(catalog(3));

    let response = send(&app.router, request(Method::GET, "/api/nbs/?page=5", None, None)).await;

    let page = &response.json()["data"];
    assert_eq!(page["results"], json!([]));
    assert_eq!(page["totalElements"], 3);
    assert_eq!(page["lastPage"], true);
}

#[tokio::test]
async fn empty_catalog_is_a_single_empty_last_page() {
    let app = test_app(vec![]);

    let response = send(&app.router, request(Method::GET, "/api/nbs/", None, None)).await;

    let page = &response.json()["data"];
    assert_eq!(page["totalPages"], 0);
    assert_eq!(page["lastPage"], true);
}

// --- Zone filter ---

#[tokio::test]
async fn zone_filter_is_case_insensitive() {
    let app = test_app(catalog(8));

    let response = send(&app.router, request(Method::GET, "/api/nbs/zone/boreal", None, None)).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["message"], "NBSs for Boreal zone retrieved successfully");
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|summary| summary["climateZone"] == "BOREAL"));
}

#[tokio::test]
async fn unknown_zone_is_a_bad_request() {
    let app = test_app(catalog(2));

    let response = send(&app.router, request(Method::GET, "/api/nbs/zone/ARCTIC", None, None)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"]["climateZone"], "Invalid climate zone: ARCTIC");
}

// --- Single records ---

#[tokio::test]
async fn get_by_id_returns_the_full_record() {
    let records = catalog(2);
    let id = records[1].id;
    let app = test_app(records);

    let response = send(&app.router, request(Method::GET, &format!("/api/nbs/{id}"), None, None)).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["message"], "NBS retrieved successfully");
    assert_eq!(body["data"]["id"], id.to_string());
    assert_eq!(body["data"]["title"], "NBS 01");
    assert_eq!(body["data"]["status"], "UNDER_IMPLEMENTATION");
    assert_eq!(body["data"]["lessonsLearnt"], "Engage residents early");
}

#[tokio::test]
async fn non_uuid_id_is_not_found() {
    let app = test_app(catalog(1));

    let response = send(&app.router, request(Method::GET, "/api/nbs/not-a-uuid", None, None)).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["errors"], "NBS with id: not-a-uuid not found in DB");
}

#[tokio::test]
async fn get_by_title_matches_exactly() {
    let app = test_app(catalog(3));

    let found = send(&app.router, request(Method::GET, "/api/nbs/title/NBS%2001", None, None)).await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.json()["data"]["title"], "NBS 01");

    let missing = send(&app.router, request(Method::GET, "/api/nbs/title/nbs%2001", None, None)).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.json()["errors"], "NBS with title: nbs 01 not found in DB");
}

#[tokio::test]
async fn geolocations_cover_every_record() {
    let app = test_app(catalog(5));

    let response = send(&app.router, request(Method::GET, "/api/nbs/geolocations", None, None)).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["message"], "NBSs geolocations retrieved successfully");
    let locations = body["data"].as_array().unwrap();
    assert_eq!(locations.len(), 5);
    assert_eq!(locations[0]["latitude"], 41.3874);
    assert_eq!(locations[0]["address"], "Barcelona, Spain");
}

// --- Create ---

#[tokio::test]
async fn create_then_fetch() {
    let app = test_app(vec![]);
    let payload = serde_json::to_value(valid_request("Green Roofs of Barcelona")).unwrap();

    let created = send(
        &app.router,
        request(Method::POST, "/api/manage/nbs", Some(&manager_token()), Some(payload)),
    )
    .await;

    assert_eq!(created.status, StatusCode::CREATED);
    let body = created.json();
    assert_eq!(body["message"], "NBS created successfully");
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(app.repo.len(), 1);

    let fetched = send(&app.router, request(Method::GET, &format!("/api/nbs/{id}"), None, None)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    let record = &fetched.json()["data"];
    assert_eq!(record["title"], "Green Roofs of Barcelona");
    assert_eq!(record["climateZone"], "MEDITERRANEAN");
    assert_eq!(record["isUrBreathNbs"], true);
}

#[tokio::test]
async fn create_accepts_lowercase_enums_and_trims_title() {
    let app = test_app(vec![]);
    let mut payload = serde_json::to_value(valid_request("  Rain Gardens  ")).unwrap();
    payload["climateZone"] = json!("continental");
    payload["status"] = json!("implemented");

    let created = send(
        &app.router,
        request(Method::POST, "/api/manage/nbs", Some(&manager_token()), Some(payload)),
    )
    .await;

    assert_eq!(created.status, StatusCode::CREATED);
    let fetched = send(&app.router, request(Method::GET, "/api/nbs/title/Rain%20Gardens", None, None)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.json()["data"]["status"], "IMPLEMENTED");
}

#[tokio::test]
async fn duplicate_title_is_expectation_failed() {
    let app = test_app(catalog(1));
    let payload = serde_json::to_value(valid_request("NBS 00")).unwrap();

    let response = send(
        &app.router,
        request(Method::POST, "/api/manage/nbs", Some(&manager_token()), Some(payload)),
    )
    .await;

    assert_eq!(response.status, StatusCode::EXPECTATION_FAILED);
    let body = response.json();
    assert_eq!(body["message"], "Resource already exists");
    assert_eq!(body["errors"], "NBS with title: NBS 00 already exists");
    assert_eq!(app.repo.len(), 1);
}

#[tokio::test]
async fn empty_payload_reports_every_violation() {
    let app = test_app(vec![]);

    let response = send(
        &app.router,
        request(Method::POST, "/api/manage/nbs", Some(&manager_token()), Some(json!({}))),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let errors = response.json()["errors"].clone();
    assert_eq!(errors["title"], "Title is required");
    assert_eq!(errors["climateZone"], "Climate zone is required");
    assert_eq!(errors["geoLocation"], "Geolocation is required");
    assert_eq!(errors["keywords"], "Keywords are required");
    assert_eq!(errors["kpis"], "KPIs are required");
    assert_eq!(errors["mainImage"], "Main image is required");
    assert!(errors.get("isUrBreathNbs").is_none());
    assert_eq!(app.repo.len(), 0);
}

#[tokio::test]
async fn unknown_enum_value_is_a_bad_request() {
    let app = test_app(vec![]);
    let mut payload = serde_json::to_value(valid_request("Bioswales")).unwrap();
    payload["climateZone"] = json!("ARCTIC");

    let response = send(
        &app.router,
        request(Method::POST, "/api/manage/nbs", Some(&manager_token()), Some(payload)),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["success"], false);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = test_app(vec![]);
    let mut req = request(Method::POST, "/api/manage/nbs", Some(&manager_token()), None);
    req.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("application/json"),
    );
    *req.body_mut() = axum::body::Body::from("{\"title\": ");

    let response = send(&app.router, req).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["message"], "Validation failed");
}

// --- Presigned uploads ---

#[tokio::test]
async fn presigned_url_is_issued_for_managers() {
    let app = test_app(vec![]);

    let response = send(
        &app.router,
        request(
            Method::POST,
            "/api/manage/uploads/presigned",
            Some(&manager_token()),
            Some(json!({
                "nbsTitle": "Green Roofs",
                "filename": "overview.jpg",
                "contentType": "image/jpeg"
            })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let data = response.json()["data"].clone();
    let key = data["resourceKey"].as_str().unwrap();
    assert!(key.starts_with("Green Roofs_"));
    assert!(key.ends_with("_overview.jpg"));
    assert!(data["uploadUrl"].as_str().unwrap().contains("signature=fake"));
}

#[tokio::test]
async fn presigned_key_flattens_traversal() {
    let app = test_app(vec![]);

    let response = send(
        &app.router,
        request(
            Method::POST,
            "/api/manage/uploads/presigned",
            Some(&manager_token()),
            Some(json!({
                "nbsTitle": "../secrets",
                "filename": "../../etc/passwd",
                "contentType": "text/plain"
            })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let key = response.json()["data"]["resourceKey"].as_str().unwrap().to_string();
    assert!(!key.contains(".."));
    assert!(!key.contains('/'));
    assert!(key.starts_with("secrets_"));
    assert!(key.ends_with("_etc_passwd"));
}

#[tokio::test]
async fn presigned_requires_content_type() {
    let app = test_app(vec![]);

    let response = send(
        &app.router,
        request(
            Method::POST,
            "/api/manage/uploads/presigned",
            Some(&manager_token()),
            Some(json!({ "nbsTitle": "Green Roofs", "filename": "a.jpg", "contentType": " " })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errors"]["contentType"], "Content type is required");
}

#[tokio::test]
async fn presigned_rejects_empty_names() {
    let app = test_app(vec![]);

    let response = send(
        &app.router,
        request(
            Method::POST,
            "/api/manage/uploads/presigned",
            Some(&manager_token()),
            Some(json!({ "nbsTitle": "..", "filename": "a.jpg", "contentType": "image/jpeg" })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn storage_failure_is_internal_error() {
    let app = app_with(
        vec![],
        MockStorageService::new_failing(),
        MockDataCollector::default(),
        AppConfig::default(),
    );

    let response = send(
        &app.router,
        request(
            Method::POST,
            "/api/manage/uploads/presigned",
            Some(&manager_token()),
            Some(json!({ "nbsTitle": "Green Roofs", "filename": "a.jpg", "contentType": "image/jpeg" })),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["message"], "Internal storage error");
}

// --- Proxy ---

#[tokio::test]
async fn proxy_returns_upstream_ids() {
    let app = test_app(vec![]);

    let datasets = send(
        &app.router,
        request(Method::GET, "/api/proxy/datasets", Some(&manager_token()), None),
    )
    .await;
    assert_eq!(datasets.status, StatusCode::OK);
    let body = datasets.json();
    assert_eq!(body["message"], "Idra Datasets retrieved successfully");
    assert_eq!(body["data"], json!(["dataset-1", "dataset-2"]));

    let kpis = send(&app.router, request(Method::GET, "/api/proxy/kpis", Some(&manager_token()), None)).await;
    assert_eq!(kpis.json()["message"], "KPIs retrieved successfully");
    assert_eq!(kpis.json()["data"], json!(["kpi-1"]));
}

#[tokio::test]
async fn proxy_failure_is_internal_error() {
    let app = app_with(
        vec![],
        MockStorageService::new(),
        MockDataCollector::new_failing(),
        AppConfig::default(),
    );

    let response = send(
        &app.router,
        request(Method::GET, "/api/proxy/kpis", Some(&manager_token()), None),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json();
    assert_eq!(body["message"], "Internal proxy error");
    assert_eq!(body["errors"], "kpi-manager answered with status 502 Bad Gateway");
}

#[tokio::test]
async fn zone_listing_matches_repository_filter() {
    let app = test_app(catalog(9));

    for zone in ClimateZone::ALL {
        let uri = format!("/api/nbs/zone/{}", zone.name());
        let response = send(&app.router, request(Method::GET, &uri, None, None)).await;
        let results = response.json()["data"]["results"].as_array().unwrap().clone();
        assert!(!results.is_empty(), "{zone}");
        assert!(results.iter().all(|summary| summary["climateZone"] == zone.name()));
    }
}
