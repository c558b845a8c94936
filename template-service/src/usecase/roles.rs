//! Role use-cases

use async_trait::async_trait;

use super::{Transactional, UseCase};
use crate::db::{Crud, Role, Session, TransactionScope};
use crate::error::AppError;
use crate::schemas::{NewRole, Page};

/// List roles ordered by id
pub struct GetAllRoles {
    roles: Crud<Role>,
}

impl GetAllRoles {
    pub fn new(session: Session) -> Self {
        Self {
            roles: Crud::new(session),
        }
    }
}

#[async_trait]
impl UseCase for GetAllRoles {
    type Input = Page;
    type Output = Vec<Role>;

    async fn execute(&self, page: Page) -> Result<Vec<Role>, AppError> {
        Ok(self.roles.get_multi(page.offset, page.limit).await?)
    }
}

impl Transactional for GetAllRoles {
    fn scope(&self) -> &dyn TransactionScope {
        self.roles.session()
    }
}

/// Fetch one role
pub struct GetRoleById {
    roles: Crud<Role>,
}

impl GetRoleById {
    pub fn new(session: Session) -> Self {
        Self {
            roles: Crud::new(session),
        }
    }
}

#[async_trait]
impl UseCase for GetRoleById {
    type Input = i32;
    type Output = Role;

    async fn execute(&self, role_id: i32) -> Result<Role, AppError> {
        Ok(self.roles.get(role_id).await?)
    }
}

impl Transactional for GetRoleById {
    fn scope(&self) -> &dyn TransactionScope {
        self.roles.session()
    }
}

/// Create a role
pub struct CreateRole {
    roles: Crud<Role>,
}

impl CreateRole {
    pub fn new(session: Session) -> Self {
        Self {
            roles: Crud::new(session),
        }
    }
}

#[async_trait]
impl UseCase for CreateRole {
    type Input = NewRole;
    type Output = Role;

    async fn execute(&self, role: NewRole) -> Result<Role, AppError> {
        let created = self.roles.create(role.into_fields()).await?;
        tracing::info!(role_id = created.id, "Role created");
        Ok(created)
    }
}

impl Transactional for CreateRole {
    fn scope(&self) -> &dyn TransactionScope {
        self.roles.session()
    }
}
