//! Use-cases and the transactional wrapper
//!
//! A use-case is one application operation: typed input, typed output or an
//! [`AppError`]. Use-cases that work against a request [`Session`] declare the
//! [`Transactional`] capability; the request scope then registers them wrapped
//! in [`InTransaction`], so their bodies always run inside a transaction:
//!
//! - no transaction open yet → `BEGIN` ... `COMMIT` / `ROLLBACK`
//! - called from inside another use-case → `SAVEPOINT` ... `RELEASE` /
//!   `ROLLBACK TO SAVEPOINT`, leaving the outer transaction usable
//!
//! Errors from the body are returned unchanged after the rollback.
//!
//! [`Session`]: crate::db::Session

pub mod roles;
pub mod users;

use std::future::Future;

use async_trait::async_trait;

use crate::db::TransactionScope;
use crate::error::AppError;

pub use roles::{CreateRole, GetAllRoles, GetRoleById};
pub use users::{CreateUser, DeleteUser, GetAllUsers, GetUserById, UpdateUser};

/// A single application operation
#[async_trait]
pub trait UseCase: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, AppError>;
}

/// Capability: the use-case runs against a transaction scope and wants its
/// invocations demarcated automatically.
pub trait Transactional: Send + Sync {
    fn scope(&self) -> &dyn TransactionScope;
}

/// Decorator running the inner use-case inside a transaction or savepoint
pub struct InTransaction<U> {
    inner: U,
}

impl<U> InTransaction<U>
where
    U: UseCase + Transactional,
{
    pub fn new(inner: U) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &U {
        &self.inner
    }
}

#[async_trait]
impl<U> UseCase for InTransaction<U>
where
    U: UseCase + Transactional,
{
    type Input = U::Input;
    type Output = U::Output;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, AppError> {
        transactional(self.inner.scope(), self.inner.execute(input)).await
    }
}

/// Run `body` inside a new transaction level on `scope`.
///
/// Opens a top-level transaction or, when one is already active, a nested
/// savepoint. The level is committed if `body` succeeds and rolled back if it
/// fails; the body's error is always the one returned.
pub async fn transactional<T, F>(scope: &dyn TransactionScope, body: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send,
{
    scope.begin().await?;

    match body.await {
        Ok(output) => {
            scope.commit().await?;
            Ok(output)
        }
        Err(err) => {
            if let Err(rollback_err) = scope.rollback().await {
                tracing::error!(error = %rollback_err, "Rollback failed after use-case error");
            }
            Err(err)
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::RecordingScope;
    use super::*;

    /// Writes a row, failing afterwards when asked to.
    struct WriteRow {
        scope: Arc<RecordingScope>,
    }

    #[async_trait]
    impl UseCase for WriteRow {
        type Input = (&'static str, bool);
        type Output = ();

        async fn execute(&self, (row, fail): Self::Input) -> Result<(), AppError> {
            self.scope.write(row);
            if fail {
                return Err(AppError::Internal(format!("failed after writing {}", row)));
            }
            Ok(())
        }
    }

    impl Transactional for WriteRow {
        fn scope(&self) -> &dyn TransactionScope {
            self.scope.as_ref()
        }
    }

    /// Writes its own row, then calls the inner use-case, optionally
    /// swallowing the inner failure.
    struct Outer {
        scope: Arc<RecordingScope>,
        inner: InTransaction<WriteRow>,
        recover: bool,
    }

    #[async_trait]
    impl UseCase for Outer {
        type Input = bool;
        type Output = ();

        async fn execute(&self, inner_fails: bool) -> Result<(), AppError> {
            self.scope.write("outer");
            match self.inner.execute(("inner", inner_fails)).await {
                Err(_) if self.recover => Ok(()),
                other => other,
            }
        }
    }

    impl Transactional for Outer {
        fn scope(&self) -> &dyn TransactionScope {
            self.scope.as_ref()
        }
    }

    fn outer(scope: &Arc<RecordingScope>, recover: bool) -> InTransaction<Outer> {
        InTransaction::new(Outer {
            scope: scope.clone(),
            inner: InTransaction::new(WriteRow {
                scope: scope.clone(),
            }),
            recover,
        })
    }

    #[tokio::test]
    async fn top_level_commit() {
        let scope = Arc::new(RecordingScope::new());
        let uc = InTransaction::new(WriteRow {
            scope: scope.clone(),
        });

        uc.execute(("a", false)).await.unwrap();

        assert_eq!(scope.statements(), vec!["BEGIN", "INSERT a", "COMMIT"]);
        assert_eq!(scope.committed(), vec!["a"]);
        assert_eq!(scope.depth_now(), 0);
    }

    #[tokio::test]
    async fn top_level_error_rolls_back_and_propagates() {
        let scope = Arc::new(RecordingScope::new());
        let uc = InTransaction::new(WriteRow {
            scope: scope.clone(),
        });

        let err = uc.execute(("a", true)).await.unwrap_err();

        assert!(matches!(err, AppError::Internal(ref m) if m == "failed after writing a"));
        assert_eq!(scope.statements(), vec!["BEGIN", "INSERT a", "ROLLBACK"]);
        assert!(scope.committed().is_empty());
    }

    #[tokio::test]
    async fn nested_call_uses_savepoint() {
        let scope = Arc::new(RecordingScope::new());

        outer(&scope, false).execute(false).await.unwrap();

        assert_eq!(
            scope.statements(),
            vec![
                "BEGIN",
                "INSERT outer",
                "SAVEPOINT sp_1",
                "INSERT inner",
                "RELEASE SAVEPOINT sp_1",
                "COMMIT",
            ]
        );
        assert_eq!(scope.committed(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn recovered_inner_failure_keeps_outer_writes() {
        let scope = Arc::new(RecordingScope::new());

        outer(&scope, true).execute(true).await.unwrap();

        assert_eq!(
            scope.statements(),
            vec![
                "BEGIN",
                "INSERT outer",
                "SAVEPOINT sp_1",
                "INSERT inner",
                "ROLLBACK TO SAVEPOINT sp_1",
                "RELEASE SAVEPOINT sp_1",
                "COMMIT",
            ]
        );
        assert_eq!(scope.committed(), vec!["outer"]);
    }

    #[tokio::test]
    async fn unrecovered_inner_failure_rolls_back_everything() {
        let scope = Arc::new(RecordingScope::new());

        let result = outer(&scope, false).execute(true).await;

        assert!(result.is_err());
        assert_eq!(scope.statements().last().map(String::as_str), Some("ROLLBACK"));
        assert!(scope.committed().is_empty());
        assert_eq!(scope.depth_now(), 0);
    }
}
