//! Axum server setup
//!
//! Layers, outermost first:
//! - CORS and `TraceLayer`
//! - request metrics (when enabled)
//! - access log
//! - CSRF (matched routes only)
//! - request scope (matched routes only, opens the per-request session)
//!
//! Graceful shutdown on SIGTERM/Ctrl+C.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::middleware::{access_log, csrf, track_metrics};
use super::routes;
use crate::di::{self, AppContainer};

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.trim_end_matches('/').parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router with all routes and middleware.
pub fn build_router(container: AppContainer) -> Router {
    let settings = container.settings.clone();

    let mut app = Router::new()
        .nest("/api/v1", routes::api_router())
        .merge(routes::health::router())
        .merge(routes::docs::router());
    if settings.common.prometheus_enabled {
        app = app.merge(routes::metrics::router());
    }

    // Route layers only wrap matched method handlers, so a wrong method gets
    // its 405 before CSRF runs or a session is opened.
    let mut app = app
        .route_layer(from_fn_with_state(container.clone(), di::request_scope))
        .route_layer(from_fn_with_state(Arc::new(settings.auth.clone()), csrf))
        .layer(from_fn_with_state(Arc::new(settings.common.clone()), access_log));
    if settings.common.prometheus_enabled {
        app = app.layer(from_fn_with_state(container.metrics.clone(), track_metrics));
    }

    app.layer(cors_layer(&settings.common.backend_cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(container)
}

/// Run the HTTP server until a shutdown signal arrives.
pub async fn run_server(container: AppContainer) -> Result<(), ServerError> {
    let bind_addr = container.settings.common.bind_addr;
    let app = build_router(container);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
