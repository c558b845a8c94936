//! Liveness probe

use axum::{routing::get, Router};

/// GET /health/
async fn health() -> &'static str {
    "OK"
}

/// Health routes. Both `/health` and `/health/` answer; other methods get 405.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health/", get(health))
        .route("/health", get(health))
}
