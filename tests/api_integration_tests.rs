//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint against a store in a
//! temporary directory.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use privacy_cache::{
    api::create_router,
    cache::{CacheStore, StoreSettings},
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app(dir: &TempDir) -> (Router, Arc<CacheStore>) {
    create_test_app_with(StoreSettings::new(dir.path().join("cache")))
}

fn create_test_app_with(settings: StoreSettings) -> (Router, Arc<CacheStore>) {
    let store = Arc::new(CacheStore::open(settings).unwrap());
    let state = AppState::new(Arc::clone(&store), 30, true);
    (create_router(state), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// == SET Endpoint Tests ==

#[tokio::test]
async fn test_set_endpoint_success() {
    let dir = TempDir::new().unwrap();
    let (app, store) = create_test_app(&dir);

    let response = send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "dash:stats", "value": {"success_rate": 0.75}})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert!(json["message"].as_str().unwrap().contains("dash:stats"));
    assert!(json["bytes"].as_u64().unwrap() > 0);
    assert!(store.path_for("dash:stats").exists());
}

#[tokio::test]
async fn test_set_endpoint_sanitizes_before_storing() {
    let dir = TempDir::new().unwrap();
    let (app, store) = create_test_app(&dir);

    let value = json!({
        "profile": {"email": "ana@example.com", "score": 12},
        "items": [{"auth_token": "abc"}]
    });
    let response = send(&app, "PUT", "/set", Some(json!({"key": "p", "value": value}))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let raw = std::fs::read_to_string(store.path_for("p")).unwrap();
    assert!(!raw.contains("ana@example.com"));
    assert!(!raw.contains("abc"));

    let response = send(&app, "GET", "/get/p", None).await;
    let json = body_to_json(response.into_body()).await;
    assert_eq!(
        json["value"],
        json!({
            "profile": {"email": "[REDACTED]", "score": 12},
            "items": [{"auth_token": "[REDACTED]"}]
        })
    );
}

#[tokio::test]
async fn test_set_rejected_activity_returns_422() {
    let dir = TempDir::new().unwrap();
    let (app, store) = create_test_app(&dir);

    let value = json!({"id": 3, "type": "review", "privacy_level": "shared"});
    let response = send(&app, "PUT", "/set", Some(json!({"key": "act", "value": value}))).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!store.path_for("act").exists());
    assert_eq!(store.metrics().snapshot().privacy.violations, 1);
}

#[tokio::test]
async fn test_set_too_large_returns_413() {
    let dir = TempDir::new().unwrap();
    let settings = StoreSettings {
        max_entry_size: 128,
        ..StoreSettings::new(dir.path().join("cache"))
    };
    let (app, store) = create_test_app_with(settings);

    let response = send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "big", "value": "x".repeat(512)})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_to_json(response.into_body()).await;
    assert!(json.get("error").is_some());
    assert!(store.is_empty());
}

// == GET Endpoint Tests ==

#[tokio::test]
async fn test_get_endpoint_not_found() {
    let dir = TempDir::new().unwrap();
    let (app, store) = create_test_app(&dir);

    let response = send(&app, "GET", "/get/nonexistent", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("nonexistent"));
    assert_eq!(store.metrics().miss_count(), 1);
}

// == DELETE Endpoint Tests ==

#[tokio::test]
async fn test_delete_endpoint_success() {
    let dir = TempDir::new().unwrap();
    let (app, store) = create_test_app(&dir);

    send(&app, "PUT", "/set", Some(json!({"key": "gone", "value": 1}))).await;
    let path = store.path_for("gone");
    assert!(path.exists());

    let response = send(&app, "DELETE", "/del/gone", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!path.exists());

    let response = send(&app, "DELETE", "/del/gone", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// == CLEAR Endpoint Tests ==

#[tokio::test]
async fn test_clear_endpoint_removes_everything() {
    let dir = TempDir::new().unwrap();
    let (app, store) = create_test_app(&dir);

    for key in ["a", "b", "c"] {
        send(&app, "PUT", "/set", Some(json!({"key": key, "value": key}))).await;
    }
    assert_eq!(store.len(), 3);

    let response = send(&app, "POST", "/clear", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.is_empty());

    let response = send(&app, "POST", "/clear", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// == STATS Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _store) = create_test_app(&dir);

    send(&app, "PUT", "/set", Some(json!({"key": "s", "value": "v"}))).await;
    send(&app, "GET", "/get/s", None).await;
    send(&app, "GET", "/get/missing", None).await;

    let response = send(&app, "GET", "/stats", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["hits"], 1);
    assert_eq!(json["misses"], 1);
    assert_eq!(json["hit_ratio"], 0.5);
    assert_eq!(json["storage"]["entry_count"], 1);
    assert_eq!(json["privacy"]["sanitizations"], 1);
}

// == REPORT Endpoint Tests ==

#[tokio::test]
async fn test_report_served_from_cache_on_second_request() {
    let dir = TempDir::new().unwrap();
    let (app, _store) = create_test_app(&dir);

    let first = send(&app, "GET", "/report", None).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache-status"], "MISS");
    assert_eq!(first.headers()["x-cache-key"], "report:/report");
    assert_eq!(first.headers()["cache-control"], "private, max-age=30");
    assert!(first.headers().contains_key("x-cache-expires"));
    assert!(first.headers().contains_key("x-cache-stats"));
    let first_body = body_to_json(first.into_body()).await;

    let second = send(&app, "GET", "/report", None).await;
    assert_eq!(second.headers()["x-cache-status"], "HIT");
    let second_body = body_to_json(second.into_body()).await;

    assert_eq!(first_body["generated_at"], second_body["generated_at"]);
    assert_eq!(second_body["scan"]["entries"], 0);
}

#[tokio::test]
async fn test_report_key_ignores_sensitive_params() {
    let dir = TempDir::new().unwrap();
    let (app, _store) = create_test_app(&dir);

    let response = send(&app, "GET", "/report?limit=5&email=ana@example.com", None).await;
    assert_eq!(response.headers()["x-cache-key"], "report:/report:limit=5");

    let response = send(&app, "GET", "/report?email=bob@example.com&limit=5", None).await;
    assert_eq!(response.headers()["x-cache-status"], "HIT");
}

// == HEALTH Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _store) = create_test_app(&dir);

    let response = send(&app, "GET", "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

// == Error Response Tests ==

#[tokio::test]
async fn test_invalid_json_request() {
    let dir = TempDir::new().unwrap();
    let (app, _store) = create_test_app(&dir);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/set")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"invalid json"#))
                .unwrap(),
        )
        .await
        .unwrap();

    // Axum rejects malformed JSON bodies before the handler runs
    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn test_empty_key_request() {
    let dir = TempDir::new().unwrap();
    let (app, _store) = create_test_app(&dir);

    let response = send(&app, "PUT", "/set", Some(json!({"key": "", "value": "test"}))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert!(json.get("error").is_some());
}

// == TTL Expiration via API Tests ==

#[tokio::test]
async fn test_ttl_expiration_via_api() {
    let dir = TempDir::new().unwrap();
    let (app, store) = create_test_app(&dir);

    let response = send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "ttl_test", "value": "expires_soon", "ttl": 1})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, "GET", "/get/ttl_test", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let response = send(&app, "GET", "/get/ttl_test", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!store.path_for("ttl_test").exists());
}

// == Persistence Tests ==

#[tokio::test]
async fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let (app, _store) = create_test_app(&dir);
        send(&app, "PUT", "/set", Some(json!({"key": "kept", "value": [1, 2]}))).await;
    }

    let (app, store) = create_test_app(&dir);
    assert_eq!(store.metrics().snapshot().storage.entry_count, 1);

    let response = send(&app, "GET", "/get/kept", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["value"], json!([1, 2]));
}
