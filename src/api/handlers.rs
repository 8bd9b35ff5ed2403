//! API Handlers
//!
//! HTTP request handlers for the cache admin endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::Uri,
    Json,
};

use crate::cache::{run_blocking, CacheStore, MetricsSnapshot};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::middleware::{CachedResponse, RequestInfo, ResponseCache};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, ReportResponse, SetRequest,
    SetResponse,
};

/// Key prefix of cached storage reports
pub const REPORT_PREFIX: &str = "report";

/// Application state shared across all handlers.
///
/// The store is created once at startup and injected here; handlers never
/// reach for global state.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache store
    pub store: Arc<CacheStore>,
    /// Response cache in front of the storage report
    pub report_cache: ResponseCache,
}

impl AppState {
    /// Creates a new AppState around an opened store.
    pub fn new(store: Arc<CacheStore>, report_ttl: u64, monitoring: bool) -> Self {
        let report_cache = ResponseCache::new(Arc::clone(&store), REPORT_PREFIX)
            .with_ttl(report_ttl)
            .with_monitoring(monitoring);
        Self {
            store,
            report_cache,
        }
    }

    /// Opens the store described by the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = CacheStore::open(config.store_settings())?;
        Ok(Self::new(Arc::new(store), config.report_ttl, config.monitoring))
    }
}

/// Handler for PUT /set
///
/// Sanitizes and stores a JSON value with optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = req.key.clone();
    let bytes = run_blocking(&state.store, move |store| {
        store.set(&req.key, &req.value, req.ttl)
    })
    .await??;

    Ok(Json(SetResponse::new(key, bytes)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let lookup_key = key.clone();
    match run_blocking(&state.store, move |store| store.get(&lookup_key)).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let delete_key = key.clone();
    if run_blocking(&state.store, move |store| store.delete(&delete_key)).await? {
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    run_blocking(&state.store, |store| store.clear()).await??;
    Ok(Json(ClearResponse::cleared()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.store.metrics().snapshot())
}

/// Handler for GET /report
///
/// Scanning the directory is comparatively slow, so the report is served
/// through the response cache.
pub async fn report_handler(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Result<CachedResponse> {
    let request = RequestInfo::new(uri.path()).with_params(params);
    let store = Arc::clone(&state.store);

    state
        .report_cache
        .call(request, |_| async move {
            let report = run_blocking(&store, |store| {
                ReportResponse::new(store.storage_report(), store.metrics().snapshot())
            })
            .await?;
            Ok::<_, CacheError>(serde_json::to_value(report)?)
        })
        .await
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoreSettings;
    use crate::middleware::CacheStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> AppState {
        let store = CacheStore::open(StoreSettings::new(dir.path().join("cache"))).unwrap();
        AppState::new(Arc::new(store), 30, false)
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let req = SetRequest {
            key: "dash:stats".to_string(),
            value: json!({"success_rate": 0.75}),
            ttl: Some(300),
        };
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let response = get_handler(State(state), Path("dash:stats".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, json!({"success_rate": 0.75}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let req = SetRequest {
            key: "to_delete".to_string(),
            value: json!("value"),
            ttl: None,
        };
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        let result = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(result.is_ok());

        let result = delete_handler(State(state), Path("to_delete".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.store.set("a", &json!(1), None).unwrap();

        clear_handler(State(state.clone())).await.unwrap();
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
    }

    #[tokio::test]
    async fn test_report_handler_is_cached() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let uri: Uri = "/report".parse().unwrap();

        let first = report_handler(State(state.clone()), uri.clone(), Query(HashMap::new()))
            .await
            .unwrap();
        let second = report_handler(State(state), uri, Query(HashMap::new()))
            .await
            .unwrap();

        assert_eq!(first.meta.status, CacheStatus::Miss);
        assert_eq!(second.meta.status, CacheStatus::Hit);
        assert_eq!(second.meta.key, "report:/report");
        assert_eq!(first.body["generated_at"], second.body["generated_at"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_handlers_on_multi_thread_runtime() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let state = state.clone();
                tokio::spawn(async move {
                    let key = format!("k{}", i % 4);
                    let req = SetRequest {
                        key: key.clone(),
                        value: json!({"n": i}),
                        ttl: Some(60),
                    };
                    set_handler(State(state.clone()), Json(req)).await.unwrap();
                    // A read can land between shredding the old version and
                    // renaming the new one into place.
                    let _ = get_handler(State(state), Path(key)).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(state.store.len(), 4);
        let snap = state.store.metrics().snapshot();
        assert_eq!(snap.hits + snap.misses, 16);
        assert_eq!(snap.storage.entry_count, 4);
        assert_eq!(snap.privacy.sanitizations, 16);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let req = SetRequest {
            key: "".to_string(),
            value: json!("value"),
            ttl: None,
        };
        let result = set_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }
}
