//! Privacy Cache - a privacy-aware, file-backed cache
//!
//! Sanitizes values before they reach disk, expires them by TTL, keeps the
//! directory under a byte budget and overwrites entries before unlinking.
//! A response-caching wrapper puts the store in front of expensive handlers.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheStore;
pub use config::Config;
pub use middleware::ResponseCache;
pub use tasks::spawn_cleanup_task;
