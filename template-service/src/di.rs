//! Dependency container with application and request scopes
//!
//! - [`AppContainer`]: process lifetime. Settings, the pool, the metrics
//!   registry. Cloned into every request as router state.
//! - [`RequestScope`]: one per request. Owns the request's [`Session`]; opened
//!   by the [`request_scope`] middleware and closed after the handler returns.
//! - Use-cases: built fresh from the request scope on every resolution via
//!   [`Provide`], pulled into handlers with the [`Inject`] extractor.
//!
//! Every use-case with the [`Transactional`] capability is registered wrapped
//! in [`InTransaction`], so handlers only ever see the wrapped form.
//!
//! [`Transactional`]: crate::usecase::Transactional

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use sqlx::PgPool;

use crate::config::Settings;
use crate::db::{DbError, Session};
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::usecase::{
    CreateRole, CreateUser, DeleteUser, GetAllRoles, GetAllUsers, GetRoleById, GetUserById,
    InTransaction, UpdateUser,
};

/// Application-scoped dependencies
#[derive(Clone)]
pub struct AppContainer {
    pub settings: Arc<Settings>,
    pub pool: PgPool,
    pub metrics: Arc<Metrics>,
}

impl AppContainer {
    pub fn new(settings: Settings, pool: PgPool) -> Self {
        Self {
            settings: Arc::new(settings),
            pool,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Open a request scope backed by this container's pool.
    pub fn request_scope(&self) -> RequestScope {
        RequestScope {
            session: Session::new(self.pool.clone()),
        }
    }

    /// Release application resources. Waits for checked-out connections.
    pub async fn close(&self) {
        tracing::info!("Closing database pool");
        self.pool.close().await;
    }
}

/// Request-scoped dependencies
#[derive(Clone)]
pub struct RequestScope {
    session: Session,
}

impl RequestScope {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn close(&self) -> Result<(), DbError> {
        self.session.close().await
    }
}

/// Build a value from the current request scope.
pub trait Provide: Sized {
    fn provide(scope: &RequestScope) -> Self;
}

impl Provide for Session {
    fn provide(scope: &RequestScope) -> Self {
        scope.session.clone()
    }
}

macro_rules! provide_in_transaction {
    ($($usecase:ident),+ $(,)?) => {
        $(
            impl Provide for InTransaction<$usecase> {
                fn provide(scope: &RequestScope) -> Self {
                    InTransaction::new($usecase::new(scope.session.clone()))
                }
            }
        )+
    };
}

provide_in_transaction!(
    GetAllRoles,
    GetRoleById,
    CreateRole,
    GetAllUsers,
    GetUserById,
    CreateUser,
    UpdateUser,
    DeleteUser,
);

/// Extractor resolving `T` from the request scope
pub struct Inject<T>(pub T);

impl<S, T> FromRequestParts<S> for Inject<T>
where
    S: Send + Sync,
    T: Provide,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let scope = parts
            .extensions
            .get::<RequestScope>()
            .ok_or_else(|| AppError::Internal("request scope is not installed".into()))?;
        Ok(Self(T::provide(scope)))
    }
}

/// Middleware opening a [`RequestScope`] around the rest of the stack.
///
/// The scope is closed once the inner service has produced a response, which
/// rolls back anything a handler left open and returns the connection.
pub async fn request_scope(
    State(container): State<AppContainer>,
    mut request: Request,
    next: Next,
) -> Response {
    let scope = container.request_scope();
    request.extensions_mut().insert(scope.clone());

    let response = next.run(request).await;

    if let Err(e) = scope.close().await {
        tracing::error!(error = %e, "Failed to close request scope");
    }
    response
}
