//! Tests against a live PostgreSQL
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p template-service -- --ignored
//!
//! Rows are named with a random suffix so tests can share one database.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use template_service::db::{create_pool, migrations, Session, TransactionScope};
use template_service::di::{Provide, RequestScope};
use template_service::schemas::{NewRole, NewUser, UserChanges};
use template_service::usecase::{
    CreateRole, CreateUser, GetUserById, InTransaction, Transactional, UpdateUser, UseCase,
};
use template_service::{build_router, AppContainer, AppError, Settings};

async fn container() -> AppContainer {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let settings = Settings::from_lookup(move |key| match key {
        "COMMON__ENVIRONMENT" => Some("test".into()),
        "AUTH__CSRF_ENABLED" => Some("false".into()),
        "POSTGRES__POOL_SIZE" => Some("1".into()),
        "DATABASE_URL" => Some(url.clone()),
        _ => None,
    })
    .expect("settings");

    let pool = create_pool(&settings.postgres).await.expect("pool");
    migrations::run(&pool).await.expect("migrations");
    AppContainer::new(settings, pool)
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
#[ignore = "requires database"]
async fn role_round_trip() {
    let app = build_router(container().await);
    let name = unique("role");

    let created = send(&app, "POST", "/api/v1/roles", Some(json!({ "role_name": name }))).await;
    assert_eq!(created.status(), StatusCode::OK);
    let created = json_body(created).await;
    assert_eq!(created["role_name"], name.as_str());

    let id = created["id"].as_i64().unwrap();
    let fetched = send(&app, "GET", &format!("/api/v1/roles/{}", id), None).await;
    assert_eq!(fetched.status(), StatusCode::OK);
    let fetched = json_body(fetched).await;
    assert_eq!(fetched["role_name"], name.as_str());

    let created_at: chrono::DateTime<Utc> =
        fetched["created_at"].as_str().unwrap().parse().unwrap();
    assert!(created_at < Utc::now());
}

#[tokio::test]
#[ignore = "requires database"]
async fn duplicate_user_name_is_conflict() {
    let app = build_router(container().await);

    let role = json_body(
        send(&app, "POST", "/api/v1/roles", Some(json!({ "role_name": unique("role") }))).await,
    )
    .await;
    let user_name = unique("user");
    let body = json!({ "user_name": user_name, "role_id": role["id"] });

    let first = send(&app, "POST", "/api/v1/users", Some(body.clone())).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(&app, "POST", "/api/v1/users", Some(body)).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(second).await["code"], "internal_error");

    let users = json_body(send(&app, "GET", "/api/v1/users", None).await).await;
    let matching = users
        .as_array()
        .unwrap()
        .iter()
        .filter(|u| u["user_name"] == user_name.as_str())
        .count();
    assert_eq!(matching, 1);
}

#[tokio::test]
#[ignore = "requires database"]
async fn unknown_role_on_create_is_conflict() {
    let app = build_router(container().await);
    let body = json!({ "user_name": unique("user"), "role_id": i32::MAX });

    let response = send(&app, "POST", "/api/v1/users", Some(body)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore = "requires database"]
async fn missing_ids_are_not_found() {
    let app = build_router(container().await);
    let missing = i32::MAX;

    for (method, uri, body) in [
        ("GET", format!("/api/v1/roles/{}", missing), None),
        ("GET", format!("/api/v1/users/{}", missing), None),
        ("DELETE", format!("/api/v1/users/{}", missing), None),
        (
            "PATCH",
            format!("/api/v1/users/{}", missing),
            Some(json!({ "user_name": unique("user") })),
        ),
    ] {
        let response = send(&app, method, &uri, body).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
        assert_eq!(json_body(response).await["code"], "internal_error");
    }
}

#[tokio::test]
#[ignore = "requires database"]
async fn update_and_delete_user() {
    let app = build_router(container().await);

    let role = json_body(
        send(&app, "POST", "/api/v1/roles", Some(json!({ "role_name": unique("role") }))).await,
    )
    .await;
    let user = json_body(
        send(
            &app,
            "POST",
            "/api/v1/users",
            Some(json!({ "user_name": unique("user"), "role_id": role["id"] })),
        )
        .await,
    )
    .await;
    let uri = format!("/api/v1/users/{}", user["id"]);

    let renamed = unique("renamed");
    let updated = send(&app, "PATCH", &uri, Some(json!({ "user_name": renamed }))).await;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated = json_body(updated).await;
    assert_eq!(updated["user_name"], renamed.as_str());
    assert_eq!(updated["role_id"], role["id"]);

    // Pointing at a missing role is reported as 404 and changes nothing.
    let bad = send(&app, "PATCH", &uri, Some(json!({ "role_id": i32::MAX }))).await;
    assert_eq!(bad.status(), StatusCode::NOT_FOUND);
    let current = json_body(send(&app, "GET", &uri, None).await).await;
    assert_eq!(current["role_id"], role["id"]);

    let deleted = send(&app, "DELETE", &uri, None).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let gone = send(&app, "GET", &uri, None).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

/// Creates a role, then tries to create a user through a nested use-case,
/// optionally recovering from its failure.
struct RoleThenUser {
    session: Session,
    create_role: CreateRole,
    create_user: InTransaction<CreateUser>,
    recover: bool,
}

#[async_trait]
impl UseCase for RoleThenUser {
    type Input = (NewRole, NewUser);
    type Output = ();

    async fn execute(&self, (role, user): Self::Input) -> Result<(), AppError> {
        self.create_role.execute(role).await?;
        match self.create_user.execute(user).await {
            Err(_) if self.recover => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

impl Transactional for RoleThenUser {
    fn scope(&self) -> &dyn TransactionScope {
        &self.session
    }
}

async fn role_exists(scope: &RequestScope, name: &str) -> bool {
    let mut state = scope.session().lock().await;
    let conn = state.connection().await.unwrap();
    let found: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM template_schema.template_user_role WHERE role_name = $1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .unwrap();
    found.is_some()
}

fn role_then_user(scope: &RequestScope, recover: bool) -> InTransaction<RoleThenUser> {
    let session = Session::provide(scope);
    InTransaction::new(RoleThenUser {
        create_role: CreateRole::new(session.clone()),
        create_user: InTransaction::new(CreateUser::new(session.clone())),
        session,
        recover,
    })
}

#[tokio::test]
#[ignore = "requires database"]
async fn recovered_inner_failure_keeps_outer_write() {
    let container = container().await;
    let scope = container.request_scope();
    let role_name = unique("role");

    // role_id pointing nowhere makes the nested insert fail.
    role_then_user(&scope, true)
        .execute((
            NewRole { role_name: role_name.clone() },
            NewUser { user_name: unique("user"), role_id: i32::MAX },
        ))
        .await
        .unwrap();

    assert!(!scope.session().in_transaction().await);
    assert!(role_exists(&scope, &role_name).await);
    scope.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn unrecovered_inner_failure_rolls_back_everything() {
    let container = container().await;
    let scope = container.request_scope();
    let role_name = unique("role");

    let err = role_then_user(&scope, false)
        .execute((
            NewRole { role_name: role_name.clone() },
            NewUser { user_name: unique("user"), role_id: i32::MAX },
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict { .. }));
    assert!(!role_exists(&scope, &role_name).await);
    scope.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn update_user_nests_lookup_in_savepoint() {
    let container = container().await;
    let scope = container.request_scope();

    let role = InTransaction::<CreateRole>::provide(&scope)
        .execute(NewRole { role_name: unique("role") })
        .await
        .unwrap();
    let user = InTransaction::<CreateUser>::provide(&scope)
        .execute(NewUser { user_name: unique("user"), role_id: role.id })
        .await
        .unwrap();

    let renamed = unique("renamed");
    let updated = InTransaction::<UpdateUser>::provide(&scope)
        .execute((
            user.id,
            UserChanges {
                user_name: Some(renamed.clone()),
                role_id: None,
            },
        ))
        .await
        .unwrap();
    assert_eq!(updated.user_name, renamed);
    assert!(updated.updated_at.is_some());

    let fetched = InTransaction::<GetUserById>::provide(&scope)
        .execute(user.id)
        .await
        .unwrap();
    assert_eq!(fetched.user_name, renamed);
    scope.close().await.unwrap();
}
