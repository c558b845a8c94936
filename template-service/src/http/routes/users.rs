//! User endpoints

use axum::{http::StatusCode, routing::get, Json, Router};

use crate::db::User;
use crate::di::Inject;
use crate::error::AppError;
use crate::http::extractors::{ValidJson, ValidPath, ValidQuery};
use crate::schemas::{CreateUserSchema, ListParams, UpdateUserSchema};
use crate::usecase::{
    CreateUser, DeleteUser, GetAllUsers, GetUserById, InTransaction, UpdateUser, UseCase,
};

/// GET /api/v1/users - list users
async fn list_users(
    Inject(usecase): Inject<InTransaction<GetAllUsers>>,
    ValidQuery(params): ValidQuery<ListParams>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = usecase.execute(params.validate()?).await?;
    Ok(Json(users))
}

/// GET /api/v1/users/{user_id} - get one user
async fn get_user(
    Inject(usecase): Inject<InTransaction<GetUserById>>,
    ValidPath(user_id): ValidPath<i32>,
) -> Result<Json<User>, AppError> {
    let user = usecase.execute(user_id).await?;
    Ok(Json(user))
}

/// POST /api/v1/users - create a user
async fn create_user(
    Inject(usecase): Inject<InTransaction<CreateUser>>,
    ValidJson(body): ValidJson<CreateUserSchema>,
) -> Result<Json<User>, AppError> {
    let user = usecase.execute(body.validate()?).await?;
    Ok(Json(user))
}

/// PATCH /api/v1/users/{user_id} - partial update
async fn update_user(
    Inject(usecase): Inject<InTransaction<UpdateUser>>,
    ValidPath(user_id): ValidPath<i32>,
    ValidJson(body): ValidJson<UpdateUserSchema>,
) -> Result<Json<User>, AppError> {
    let user = usecase.execute((user_id, body.validate()?)).await?;
    Ok(Json(user))
}

/// DELETE /api/v1/users/{user_id} - delete a user
async fn delete_user(
    Inject(usecase): Inject<InTransaction<DeleteUser>>,
    ValidPath(user_id): ValidPath<i32>,
) -> Result<StatusCode, AppError> {
    usecase.execute(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// User routes, relative to `/api/v1`
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{user_id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
}
