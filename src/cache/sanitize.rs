//! Sanitizer Module
//!
//! Recursive redaction of sensitive fields in JSON values before they are
//! persisted or returned from the cache.
//!
//! Generic maps have any key matching a sensitivity pattern replaced with
//! [`REDACTED`]. Activity records (objects carrying both `type` and
//! `privacy_level`) get finer rules: URLs and emails are scrubbed from
//! `description`, `local_storage_path` keeps only its file name, and
//! `metadata` is filtered down to an allow-list.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::MetricsCollector;

/// Replacement for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Case-insensitive substrings that mark a map key as sensitive
pub const SENSITIVE_PATTERNS: &[&str] = &[
    "email",
    "password",
    "token",
    "secret",
    "api_key",
    "session",
    "auth",
    "key",
    "user_id",
    "ip_address",
    "device_info",
    "location",
    "timestamp",
    "metadata",
];

/// Privacy levels an activity record may declare
pub const PRIVACY_LEVELS: &[&str] = &["public", "private", "anonymized", "aggregated"];

/// Sub-fields of activity `metadata` that survive sanitization
pub const SAFE_METADATA_FIELDS: &[&str] = &[
    "duration",
    "word_count",
    "score",
    "category",
    "difficulty",
    "language",
    "status",
    "attempts",
];

/// Deepest nesting accepted before a value is refused
pub const MAX_DEPTH: usize = 32;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?|ftp)://[^\s]+|\bwww\.[^\s]+").unwrap());

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

// == Rejection ==
/// Why a value cannot be cached.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SanitizeRejection {
    #[error("activity record has no id")]
    MissingIdentity,

    #[error("unrecognized privacy level: {0}")]
    UnknownPrivacyLevel(String),

    #[error("value nested deeper than {0} levels")]
    TooDeep(usize),
}

// == Sanitizer ==
/// Sanitizes values and reports the outcome to the metrics collector.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    metrics: Arc<MetricsCollector>,
}

impl Sanitizer {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }

    /// Returns a redacted copy of `value`, or the reason it must not be
    /// stored. Success bumps the sanitization counter, rejection bumps the
    /// privacy-violation counter.
    pub fn sanitize(&self, value: &Value) -> Result<Value, SanitizeRejection> {
        match sanitize_value(value) {
            Ok(clean) => {
                self.metrics.record_sanitization();
                debug!("Value sanitized");
                Ok(clean)
            }
            Err(rejection) => {
                self.metrics.record_privacy_violation();
                warn!(reason = %rejection, "Refusing to cache value");
                Err(rejection)
            }
        }
    }
}

// == Pure Functions ==
/// Sanitizes `value` without touching any metrics.
pub fn sanitize_value(value: &Value) -> Result<Value, SanitizeRejection> {
    sanitize_at(value, 0)
}

/// Whether a map key names sensitive data.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Replaces URLs with `[URL]` and email addresses with `[EMAIL]`.
pub fn redact_text(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, "[URL]");
    EMAIL_RE.replace_all(&without_urls, "[EMAIL]").into_owned()
}

/// Last path component, accepting both `/` and `\` separators.
pub fn file_name_only(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or("")
}

fn sanitize_at(value: &Value, depth: usize) -> Result<Value, SanitizeRejection> {
    match value {
        Value::Object(_) | Value::Array(_) if depth >= MAX_DEPTH => {
            Err(SanitizeRejection::TooDeep(MAX_DEPTH))
        }
        Value::Object(map) if is_activity_record(map) => sanitize_activity(map, depth),
        Value::Object(map) => sanitize_map(map, depth),
        Value::Array(items) => items
            .iter()
            .map(|item| sanitize_at(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        scalar => Ok(scalar.clone()),
    }
}

fn sanitize_map(map: &Map<String, Value>, depth: usize) -> Result<Value, SanitizeRejection> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        out.insert(key.clone(), sanitize_field(key, value, depth)?);
    }
    Ok(Value::Object(out))
}

fn sanitize_field(key: &str, value: &Value, depth: usize) -> Result<Value, SanitizeRejection> {
    if is_sensitive_key(key) {
        Ok(Value::String(REDACTED.to_string()))
    } else {
        sanitize_at(value, depth + 1)
    }
}

fn is_activity_record(map: &Map<String, Value>) -> bool {
    map.contains_key("type") && map.contains_key("privacy_level")
}

fn check_activity(map: &Map<String, Value>) -> Result<(), SanitizeRejection> {
    if map.get("id").map_or(true, Value::is_null) {
        return Err(SanitizeRejection::MissingIdentity);
    }
    match map.get("privacy_level") {
        Some(Value::String(level)) if PRIVACY_LEVELS.contains(&level.as_str()) => Ok(()),
        Some(other) => Err(SanitizeRejection::UnknownPrivacyLevel(match other {
            Value::String(level) => level.clone(),
            other => other.to_string(),
        })),
        None => Err(SanitizeRejection::UnknownPrivacyLevel(String::new())),
    }
}

fn sanitize_activity(map: &Map<String, Value>, depth: usize) -> Result<Value, SanitizeRejection> {
    check_activity(map)?;

    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let clean = match (key.as_str(), value) {
            ("description", Value::String(text)) => Value::String(redact_text(text)),
            ("local_storage_path", Value::String(path)) => {
                Value::String(file_name_only(path).to_string())
            }
            ("metadata", Value::Object(meta)) => {
                let mut kept = Map::new();
                for field in SAFE_METADATA_FIELDS {
                    if let Some(v) = meta.get(*field) {
                        kept.insert((*field).to_string(), sanitize_at(v, depth + 2)?);
                    }
                }
                Value::Object(kept)
            }
            _ => sanitize_field(key, value, depth)?,
        };
        out.insert(key.clone(), clean);
    }
    Ok(Value::Object(out))
}
