//! API Module
//!
//! HTTP handlers and routing for the cache admin API.
//!
//! # Endpoints
//! - `PUT /set` - Sanitize and store a JSON value
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Securely delete a key
//! - `POST /clear` - Securely delete every entry
//! - `GET /stats` - Live metrics snapshot
//! - `GET /report` - Storage report served through the response cache
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
