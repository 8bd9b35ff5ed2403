//! Middleware Module
//!
//! Response caching in front of request handlers.

pub mod key;
pub mod response_cache;

pub use response_cache::{
    CacheMeta, CacheStatus, CachedHandler, CachedResponse, RequestInfo, ResponseCache,
};
