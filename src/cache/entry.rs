//! Cache Entry Module
//!
//! Defines the on-disk unit: one sanitized value plus its absolute expiry.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// File extension of live entries
pub const ENTRY_EXTENSION: &str = "json";

/// Longest TTL honored (~100 years); longer values are clamped.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

// == Cache Entry ==
/// A single cached value with its expiration time.
///
/// Serialized as `{"value": ..., "expire_time": "<RFC 3339>"}`. The logical
/// key is not stored; it only determines the file name through a hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The sanitized payload
    pub value: Value,
    /// Instant at which the entry becomes dead
    pub expire_time: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry that expires `ttl_seconds` from now.
    pub fn new(value: Value, ttl_seconds: u64) -> Self {
        let ttl = ttl_seconds.min(MAX_TTL_SECONDS) as i64;
        let expire_time = Utc::now() + Duration::seconds(ttl);
        Self { value, expire_time }
    }

    // == Is Expired ==
    /// An entry is dead once `now >= expire_time`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_time
    }

    // == Encoding ==
    /// Serializes the entry into the bytes written to disk.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parses an entry file. Any failure marks the file as corrupt.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// == Key Derivation ==
/// Lowercase hex SHA-256 of the logical key.
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Path of the entry file for `key` inside `dir`.
pub fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", hash_key(key), ENTRY_EXTENSION))
}

/// Whether `path` names a live entry file (as opposed to a staging file).
pub fn is_entry_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION)
}
