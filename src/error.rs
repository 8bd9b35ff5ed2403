//! Error types for the privacy cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its HTTP surface.
///
/// Corrupt on-disk entries never appear here: the store treats them as
/// misses and shreds them.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Serialized entry exceeds the per-entry quota
    #[error("Entry too large: {size} bytes exceeds limit of {max} bytes")]
    EntryTooLarge { size: usize, max: usize },

    /// Filesystem failure while writing or deleting an entry
    #[error("Store I/O failure: {0}")]
    StoreIo(#[from] std::io::Error),

    /// Value could not be encoded as an entry
    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Value failed the sanitizer's structural checks
    #[error("Sanitization rejected value: {0}")]
    SanitizationRejected(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Blocking store operation panicked or was cancelled
    #[error("Background task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::EntryTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::StoreIo(_)
            | CacheError::Serialization(_)
            | CacheError::Background(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::SanitizationRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
