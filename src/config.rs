//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::StoreSettings;

/// Default total live-entry budget (50 MiB)
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 50 * 1024 * 1024;
/// Default per-entry cap (1 MiB)
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 1024 * 1024;
/// Default TTL in seconds
pub const DEFAULT_EXPIRE: u64 = 300;
/// Usage fraction that triggers quota eviction
pub const DEFAULT_CLEANUP_THRESHOLD: f64 = 0.9;
/// Usage fraction quota eviction reduces to
pub const DEFAULT_REDUCE_TARGET: f64 = 0.7;

/// Server and cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for cache entries
    pub cache_dir: PathBuf,
    /// Total live-entry budget in bytes
    pub max_cache_size: u64,
    /// Per-entry cap in bytes, enforced before write
    pub max_entry_size: usize,
    /// TTL in seconds used when callers omit one
    pub default_expire: u64,
    /// Eviction trigger as a fraction of `max_cache_size`
    pub cleanup_threshold: f64,
    /// Eviction target as a fraction of `max_cache_size`
    pub reduce_target: f64,
    /// Attach `X-Cache-Stats` to cached responses
    pub monitoring: bool,
    /// TTL in seconds for the cached storage report
    pub report_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Entry directory (default: `$TMPDIR/privacy_cache`)
    /// - `MAX_CACHE_SIZE` - Total budget in bytes (default: 50 MiB)
    /// - `MAX_ENTRY_SIZE` - Per-entry cap in bytes (default: 1 MiB)
    /// - `CACHE_DEFAULT_EXPIRE` - Default TTL in seconds (default: 300)
    /// - `CLEANUP_THRESHOLD` - Eviction trigger fraction (default: 0.9)
    /// - `REDUCE_TARGET` - Eviction target fraction (default: 0.7)
    /// - `CACHE_MONITORING` - Emit `X-Cache-Stats` (default: false)
    /// - `REPORT_CACHE_TTL` - Storage report TTL in seconds (default: 30)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            max_cache_size: parse_var("MAX_CACHE_SIZE").unwrap_or(defaults.max_cache_size),
            max_entry_size: parse_var("MAX_ENTRY_SIZE").unwrap_or(defaults.max_entry_size),
            default_expire: parse_var("CACHE_DEFAULT_EXPIRE").unwrap_or(defaults.default_expire),
            cleanup_threshold: parse_var("CLEANUP_THRESHOLD")
                .unwrap_or(defaults.cleanup_threshold),
            reduce_target: parse_var("REDUCE_TARGET").unwrap_or(defaults.reduce_target),
            monitoring: env::var("CACHE_MONITORING")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.monitoring),
            report_ttl: parse_var("REPORT_CACHE_TTL").unwrap_or(defaults.report_ttl),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
        };
        config.normalized()
    }

    /// Returns the settings the cache store is opened with.
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            cache_dir: self.cache_dir.clone(),
            max_cache_size: self.max_cache_size,
            max_entry_size: self.max_entry_size,
            default_ttl: self.default_expire,
            cleanup_threshold: self.cleanup_threshold,
            reduce_target: self.reduce_target,
        }
    }

    /// Clamps fractions into `(0, 1]`, keeps the reduce target at or below
    /// the cleanup threshold, and keeps TTLs and sizes usable.
    ///
    /// A single entry may not exceed the reduce-target budget, otherwise
    /// eviction could never make room for it.
    fn normalized(mut self) -> Self {
        self.cleanup_threshold = clamp_fraction(self.cleanup_threshold, DEFAULT_CLEANUP_THRESHOLD);
        self.reduce_target = clamp_fraction(self.reduce_target, DEFAULT_REDUCE_TARGET)
            .min(self.cleanup_threshold);
        self.cleanup_interval = self.cleanup_interval.max(1);
        self.default_expire = self.default_expire.max(1);
        self.report_ttl = self.report_ttl.max(1);
        self.max_cache_size = self.max_cache_size.max(1);

        let target_budget = (self.max_cache_size as f64 * self.reduce_target) as u64;
        let entry_cap = usize::try_from(target_budget).unwrap_or(usize::MAX).max(1);
        self.max_entry_size = self.max_entry_size.clamp(1, entry_cap);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: env::temp_dir().join("privacy_cache"),
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            default_expire: DEFAULT_EXPIRE,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
            reduce_target: DEFAULT_REDUCE_TARGET,
            monitoring: false,
            report_ttl: 30,
            server_port: 3000,
            cleanup_interval: 60,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn clamp_fraction(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value.min(1.0)
    } else {
        fallback
    }
}
