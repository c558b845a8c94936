//! Request-scoped database session
//!
//! A [`Session`] is the unit of work for one inbound request. It owns at most
//! one pooled connection (acquired lazily, so requests that never touch the
//! database never take one) and tracks how deep the current transaction is
//! nested:
//!
//! - depth 0 → `BEGIN` opens a top-level transaction
//! - depth n → `SAVEPOINT sp_n` opens a nested level
//!
//! Closing the session rolls back anything still open and returns the
//! connection to the pool. If the last handle is dropped while a transaction
//! is open (cancelled request, panic) the connection is detached from the pool
//! instead of being returned in an unknown state.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use tokio::sync::{Mutex, MutexGuard};

use super::DbError;

/// Transaction depth bookkeeping.
///
/// Produces the SQL for each transition without executing anything, so the
/// nesting rules can be shared by every transaction scope.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TxState {
    depth: u32,
}

impl TxState {
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Statement opening the next level.
    pub fn begin_sql(&self) -> String {
        if self.depth == 0 {
            "BEGIN".to_string()
        } else {
            format!("SAVEPOINT sp_{}", self.depth)
        }
    }

    /// Statement closing the innermost level successfully.
    pub fn commit_sql(&self) -> Result<String, DbError> {
        match self.depth {
            0 => Err(DbError::NoTransaction),
            1 => Ok("COMMIT".to_string()),
            d => Ok(format!("RELEASE SAVEPOINT sp_{}", d - 1)),
        }
    }

    /// Statements undoing the innermost level.
    pub fn rollback_sql(&self) -> Result<Vec<String>, DbError> {
        match self.depth {
            0 => Err(DbError::NoTransaction),
            1 => Ok(vec!["ROLLBACK".to_string()]),
            d => Ok(vec![
                format!("ROLLBACK TO SAVEPOINT sp_{}", d - 1),
                format!("RELEASE SAVEPOINT sp_{}", d - 1),
            ]),
        }
    }

    pub fn push(&mut self) {
        self.depth += 1;
    }

    pub fn pop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.depth = 0;
    }
}

/// Something that can open, commit and roll back (possibly nested)
/// transactions.
///
/// Implemented by [`Session`]; the use-case wrapper only sees this trait.
#[async_trait]
pub trait TransactionScope: Send + Sync {
    /// Current nesting depth (0 = no transaction).
    async fn depth(&self) -> u32;

    /// Open a transaction, or a savepoint if one is already open.
    async fn begin(&self) -> Result<(), DbError>;

    /// Commit the innermost level.
    async fn commit(&self) -> Result<(), DbError>;

    /// Roll back the innermost level.
    async fn rollback(&self) -> Result<(), DbError>;
}

/// Mutable session state, reached through [`Session::lock`].
pub struct SessionState {
    pool: PgPool,
    conn: Option<PoolConnection<Postgres>>,
    tx: TxState,
    closed: bool,
}

impl SessionState {
    /// The session's connection, acquired from the pool on first use.
    pub async fn connection(&mut self) -> Result<&mut PgConnection, DbError> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }
        if self.conn.is_none() {
            let conn = self.pool.acquire().await?;
            tracing::trace!("Session acquired connection");
            self.conn = Some(conn);
        }
        match self.conn.as_mut() {
            Some(conn) => Ok(&mut **conn),
            None => Err(DbError::SessionClosed),
        }
    }

    pub fn tx(&self) -> &TxState {
        &self.tx
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<(), DbError>> {
        async move {
            let conn = self.connection().await?;
            sqlx::Executor::execute(conn, sql).await?;
            Ok(())
        }
        .boxed()
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if self.tx.in_transaction() {
            if let Some(conn) = self.conn.take() {
                tracing::warn!(
                    depth = self.tx.depth(),
                    "Session dropped inside a transaction, discarding connection"
                );
                drop(conn.detach());
            }
        }
    }
}

/// Request-scoped unit of work.
///
/// Cheap to clone; every clone refers to the same connection and transaction.
/// Clones must stay within one request.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(pool: PgPool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                pool,
                conn: None,
                tx: TxState::default(),
                closed: false,
            })),
        }
    }

    /// Lock the session for a sequence of statements.
    ///
    /// Do not hold the guard across a nested use-case call.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().await
    }

    pub async fn in_transaction(&self) -> bool {
        self.lock().await.tx.in_transaction()
    }

    /// Release the session: roll back any open transaction and give the
    /// connection back to the pool. Idempotent.
    pub async fn close(&self) -> Result<(), DbError> {
        let mut state = self.lock().await;
        if state.closed {
            return Ok(());
        }

        let mut result = Ok(());
        if state.tx.in_transaction() {
            tracing::warn!(depth = state.tx.depth(), "Closing session with open transaction, rolling back");
            result = state.execute("ROLLBACK").await;
            if result.is_err() {
                if let Some(conn) = state.conn.take() {
                    drop(conn.detach());
                }
            }
            state.tx.reset();
        }

        state.conn = None;
        state.closed = true;
        result
    }
}

#[async_trait]
impl TransactionScope for Session {
    async fn depth(&self) -> u32 {
        self.lock().await.tx.depth()
    }

    async fn begin(&self) -> Result<(), DbError> {
        let mut state = self.lock().await;
        let sql = state.tx.begin_sql();
        state.execute(&sql).await?;
        state.tx.push();
        tracing::debug!(depth = state.tx.depth(), "{}", sql);
        Ok(())
    }

    async fn commit(&self) -> Result<(), DbError> {
        let mut state = self.lock().await;
        let sql = state.tx.commit_sql()?;
        // A failed COMMIT ends the transaction too, so the level is popped either way.
        let result = state.execute(&sql).await;
        state.tx.pop();
        tracing::debug!(depth = state.tx.depth(), "{}", sql);
        result
    }

    async fn rollback(&self) -> Result<(), DbError> {
        let mut state = self.lock().await;
        let statements = state.tx.rollback_sql()?;
        let mut result = Ok(());
        for sql in &statements {
            result = state.execute(sql).await;
            if result.is_err() {
                break;
            }
        }
        state.tx.pop();
        tracing::debug!(depth = state.tx.depth(), "{}", statements.join("; "));
        result
    }
}
