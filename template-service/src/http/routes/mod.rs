//! Route handlers organized by resource

pub mod docs;
pub mod health;
pub mod metrics;
pub mod roles;
pub mod users;

use axum::Router;

use crate::di::AppContainer;

/// Versioned API routes, mounted under `/api/v1`
pub fn api_router() -> Router<AppContainer> {
    Router::new().merge(roles::router()).merge(users::router())
}
