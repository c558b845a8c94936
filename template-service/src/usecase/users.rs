//! User use-cases

use async_trait::async_trait;

use super::{InTransaction, Transactional, UseCase};
use crate::db::{Crud, Session, TransactionScope, User};
use crate::error::AppError;
use crate::schemas::{NewUser, Page, UserChanges};

/// List users ordered by id
pub struct GetAllUsers {
    users: Crud<User>,
}

impl GetAllUsers {
    pub fn new(session: Session) -> Self {
        Self {
            users: Crud::new(session),
        }
    }
}

#[async_trait]
impl UseCase for GetAllUsers {
    type Input = Page;
    type Output = Vec<User>;

    async fn execute(&self, page: Page) -> Result<Vec<User>, AppError> {
        Ok(self.users.get_multi(page.offset, page.limit).await?)
    }
}

impl Transactional for GetAllUsers {
    fn scope(&self) -> &dyn TransactionScope {
        self.users.session()
    }
}

/// Fetch one user
pub struct GetUserById {
    users: Crud<User>,
}

impl GetUserById {
    pub fn new(session: Session) -> Self {
        Self {
            users: Crud::new(session),
        }
    }
}

#[async_trait]
impl UseCase for GetUserById {
    type Input = i32;
    type Output = User;

    async fn execute(&self, user_id: i32) -> Result<User, AppError> {
        Ok(self.users.get(user_id).await?)
    }
}

impl Transactional for GetUserById {
    fn scope(&self) -> &dyn TransactionScope {
        self.users.session()
    }
}

/// Create a user
pub struct CreateUser {
    users: Crud<User>,
}

impl CreateUser {
    pub fn new(session: Session) -> Self {
        Self {
            users: Crud::new(session),
        }
    }
}

#[async_trait]
impl UseCase for CreateUser {
    type Input = NewUser;
    type Output = User;

    async fn execute(&self, user: NewUser) -> Result<User, AppError> {
        let created = self.users.create(user.into_fields()).await?;
        tracing::info!(user_id = created.id, "User created");
        Ok(created)
    }
}

impl Transactional for CreateUser {
    fn scope(&self) -> &dyn TransactionScope {
        self.users.session()
    }
}

/// Apply a partial update to a user.
///
/// Looks the user up first through the nested [`GetUserById`] so a missing id
/// is reported before any write; the lookup runs in a savepoint of this
/// use-case's transaction.
pub struct UpdateUser {
    users: Crud<User>,
    get_user: InTransaction<GetUserById>,
}

impl UpdateUser {
    pub fn new(session: Session) -> Self {
        Self {
            get_user: InTransaction::new(GetUserById::new(session.clone())),
            users: Crud::new(session),
        }
    }
}

#[async_trait]
impl UseCase for UpdateUser {
    type Input = (i32, UserChanges);
    type Output = User;

    async fn execute(&self, (user_id, changes): Self::Input) -> Result<User, AppError> {
        let current = self.get_user.execute(user_id).await?;
        let fields = changes.into_fields();
        if fields.is_empty() {
            return Ok(current);
        }

        let updated = self.users.update(user_id, fields).await?;
        tracing::info!(user_id, "User updated");
        Ok(updated)
    }
}

impl Transactional for UpdateUser {
    fn scope(&self) -> &dyn TransactionScope {
        self.users.session()
    }
}

/// Delete a user
pub struct DeleteUser {
    users: Crud<User>,
}

impl DeleteUser {
    pub fn new(session: Session) -> Self {
        Self {
            users: Crud::new(session),
        }
    }
}

#[async_trait]
impl UseCase for DeleteUser {
    type Input = i32;
    type Output = ();

    async fn execute(&self, user_id: i32) -> Result<(), AppError> {
        self.users.delete(user_id).await?;
        tracing::info!(user_id, "User deleted");
        Ok(())
    }
}

impl Transactional for DeleteUser {
    fn scope(&self) -> &dyn TransactionScope {
        self.users.session()
    }
}
