//! Request metrics middleware

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;

use crate::metrics::Metrics;

/// Route templates never recorded
const SKIPPED_PATHS: &[&str] = &["/health", "/health/", "/openapi.json", "/docs", "/metrics"];

/// Count and time requests by matched route template.
pub async fn track_metrics(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned());
    let method = request.method().clone();

    let Some(route) = route.filter(|r| !SKIPPED_PATHS.contains(&r.as_str())) else {
        return next.run(request).await;
    };
    if method == Method::OPTIONS {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    metrics.observe(method.as_str(), &route, response.status().as_u16(), start.elapsed());
    response
}
