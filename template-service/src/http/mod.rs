//! HTTP layer
//!
//! Axum server with:
//! - request-scoped sessions
//! - CSRF double-submit protection
//! - structured access logging with redaction
//! - JSON error responses
//! - Prometheus metrics (optional)

pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{build_router, run_server, ServerError};
