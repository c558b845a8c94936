//! Prometheus scrape endpoint

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{routing::get, Router};

use crate::di::AppContainer;

/// GET /metrics
async fn metrics(State(container): State<AppContainer>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        container.metrics.render(),
    )
}

/// Metrics routes
pub fn router() -> Router<AppContainer> {
    Router::new().route("/metrics", get(metrics))
}
