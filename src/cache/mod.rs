//! Cache Module
//!
//! File-backed caching with TTL expiration, quota eviction, sanitization,
//! secure deletion and runtime metrics.

mod entry;
mod metrics;
mod sanitize;
mod shred;
mod store;


// Re-export public types
pub use entry::{hash_key, CacheEntry, MAX_TTL_SECONDS};
pub use metrics::{
    CleanupStats, MetricsCollector, MetricsSnapshot, PrivacyReport, ResponseTimeStats,
    StorageReport,
};
pub use sanitize::{is_sensitive_key, sanitize_value, SanitizeRejection, Sanitizer, REDACTED};
pub use shred::secure_delete;
pub use store::{run_blocking, CacheStore, CleanupReport, StorageScan, StoreSettings};
