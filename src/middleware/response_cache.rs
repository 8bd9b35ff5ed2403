//! Response Cache Wrapper
//!
//! Puts a [`CacheStore`] in front of request handlers. A handler is any
//! async function from [`RequestInfo`] to `Result<Value, E>`; successful
//! results are cached under a key derived from the request, errors pass
//! through untouched and are never cached.

use std::future::Future;
use std::sync::Arc;

use axum::{
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{run_blocking, CacheStore, MetricsSnapshot, MAX_TTL_SECONDS};
use crate::middleware::key::derive_key;

pub const X_CACHE_STATUS: &str = "x-cache-status";
pub const X_CACHE_EXPIRES: &str = "x-cache-expires";
pub const X_CACHE_KEY: &str = "x-cache-key";
pub const X_CACHE_STATS: &str = "x-cache-stats";

// == Cache Status ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

// == Request Info ==
/// The parts of a request that feed key derivation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInfo {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl RequestInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

// == Response Metadata ==
/// Observability data attached to every wrapped response.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMeta {
    pub status: CacheStatus,
    pub ttl: u64,
    pub expires_at: DateTime<Utc>,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<MetricsSnapshot>,
}

impl CacheMeta {
    /// `private, max-age=<ttl>`
    pub fn cache_control(&self) -> String {
        format!("private, max-age={}", self.ttl)
    }

    /// Header name/value pairs describing this response.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (X_CACHE_STATUS, self.status.as_str().to_string()),
            ("cache-control", self.cache_control()),
            (X_CACHE_EXPIRES, self.expires_at.timestamp().to_string()),
            (X_CACHE_KEY, self.key.clone()),
        ];
        if let Some(stats) = &self.stats {
            if let Ok(json) = serde_json::to_string(stats) {
                headers.push((X_CACHE_STATS, json));
            }
        }
        headers
    }
}

/// A handler result together with its cache metadata.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: Value,
    pub meta: CacheMeta,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let headers = self.meta.headers();
        let mut response = Json(self.body).into_response();
        for (name, value) in headers {
            // Keys built from decoded query values may not be valid header text.
            if let Ok(value) = HeaderValue::from_str(&value) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(name), value);
            }
        }
        response
    }
}

// == Response Cache ==
/// Caches handler results in a [`CacheStore`] under a fixed key prefix.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<CacheStore>,
    prefix: String,
    ttl: u64,
    include_query_params: bool,
    monitoring: bool,
}

impl ResponseCache {
    /// Wrapper using the store's default TTL, with query parameters included
    /// in the key and monitoring off.
    pub fn new(store: Arc<CacheStore>, prefix: impl Into<String>) -> Self {
        let ttl = store.settings().default_ttl;
        Self {
            store,
            prefix: prefix.into(),
            ttl,
            include_query_params: true,
            monitoring: false,
        }
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn include_query_params(mut self, include: bool) -> Self {
        self.include_query_params = include;
        self
    }

    /// Attach an `X-Cache-Stats` snapshot to every response.
    pub fn with_monitoring(mut self, monitoring: bool) -> Self {
        self.monitoring = monitoring;
        self
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn key_for(&self, request: &RequestInfo) -> String {
        derive_key(
            &self.prefix,
            &request.path,
            request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            self.include_query_params,
        )
    }

    /// Serves `request` from the cache, or runs `handler` and caches its
    /// result.
    ///
    /// Handler errors are returned as-is. Failing to store a result is
    /// logged and the fresh value is still returned. Store access runs on
    /// the blocking pool.
    pub async fn call<F, Fut, E>(&self, request: RequestInfo, handler: F) -> Result<CachedResponse, E>
    where
        F: FnOnce(RequestInfo) -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let key = self.key_for(&request);

        let lookup_key = key.clone();
        match run_blocking(&self.store, move |store| store.lookup(&lookup_key)).await {
            Ok(Some(entry)) => {
                debug!(prefix = %self.prefix, "Serving cached response");
                return Ok(self.respond(entry.value, CacheStatus::Hit, entry.expire_time, key));
            }
            Ok(None) => {}
            Err(e) => warn!(prefix = %self.prefix, error = %e, "Cache lookup failed"),
        }

        let body = handler(request).await?;
        let (store_key, stored, ttl) = (key.clone(), body.clone(), self.ttl);
        match run_blocking(&self.store, move |store| store.set(&store_key, &stored, Some(ttl))).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) | Err(e) => {
                warn!(prefix = %self.prefix, error = %e, "Response not cached");
            }
        }

        let expires_at = Utc::now() + Duration::seconds(self.ttl.min(MAX_TTL_SECONDS) as i64);
        Ok(self.respond(body, CacheStatus::Miss, expires_at, key))
    }

    /// Binds this cache to `handler`, producing a reusable cached handler.
    pub fn wrap<H>(self, handler: H) -> CachedHandler<H> {
        CachedHandler {
            cache: self,
            handler,
        }
    }

    fn respond(
        &self,
        body: Value,
        status: CacheStatus,
        expires_at: DateTime<Utc>,
        key: String,
    ) -> CachedResponse {
        CachedResponse {
            body,
            meta: CacheMeta {
                status,
                ttl: self.ttl,
                expires_at,
                key,
                stats: self.monitoring.then(|| self.store.metrics().snapshot()),
            },
        }
    }
}

// == Cached Handler ==
/// A handler bound to a [`ResponseCache`].
#[derive(Debug, Clone)]
pub struct CachedHandler<H> {
    cache: ResponseCache,
    handler: H,
}

impl<H, Fut, E> CachedHandler<H>
where
    H: Fn(RequestInfo) -> Fut,
    Fut: Future<Output = Result<Value, E>>,
{
    pub async fn handle(&self, request: RequestInfo) -> Result<CachedResponse, E> {
        self.cache.call(request, |req| (self.handler)(req)).await
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}
