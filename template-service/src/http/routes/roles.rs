//! Role endpoints

use axum::{routing::get, Json, Router};

use crate::db::Role;
use crate::di::Inject;
use crate::error::AppError;
use crate::http::extractors::{ValidJson, ValidPath, ValidQuery};
use crate::schemas::{CreateRoleSchema, ListParams};
use crate::usecase::{CreateRole, GetAllRoles, GetRoleById, InTransaction, UseCase};

/// GET /api/v1/roles - list roles
async fn list_roles(
    Inject(usecase): Inject<InTransaction<GetAllRoles>>,
    ValidQuery(params): ValidQuery<ListParams>,
) -> Result<Json<Vec<Role>>, AppError> {
    let roles = usecase.execute(params.validate()?).await?;
    Ok(Json(roles))
}

/// GET /api/v1/roles/{role_id} - get one role
async fn get_role(
    Inject(usecase): Inject<InTransaction<GetRoleById>>,
    ValidPath(role_id): ValidPath<i32>,
) -> Result<Json<Role>, AppError> {
    let role = usecase.execute(role_id).await?;
    Ok(Json(role))
}

/// POST /api/v1/roles - create a role
async fn create_role(
    Inject(usecase): Inject<InTransaction<CreateRole>>,
    ValidJson(body): ValidJson<CreateRoleSchema>,
) -> Result<Json<Role>, AppError> {
    let role = usecase.execute(body.validate()?).await?;
    Ok(Json(role))
}

/// Role routes, relative to `/api/v1`
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{role_id}", get(get_role))
}
