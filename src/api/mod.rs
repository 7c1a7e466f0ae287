//! API Module
//!
//! HTTP handlers and routing for the cache diagnostics surface.
//!
//! # Endpoints
//! - `GET /health` - Remote cache health probe
//! - `GET /stats` - Cache statistics snapshot
//! - `POST /invalidate` - Pattern-based bulk delete

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
