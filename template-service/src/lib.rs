//! template-service: CRUD microservice template
//!
//! Roles and users over PostgreSQL, wired through an explicit container with
//! application and request scopes. Each request gets its own database
//! session; use-cases run inside a transaction, or a savepoint when nested.

pub mod config;
pub mod db;
pub mod di;
pub mod error;
pub mod http;
pub mod metrics;
pub mod schemas;
pub mod tracing_setup;
pub mod usecase;

pub use config::Settings;
pub use di::AppContainer;
pub use error::{AppError, ErrorCode};
pub use http::build_router;
