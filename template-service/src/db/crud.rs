//! Generic CRUD over a request session
//!
//! Every statement runs on the session's connection, so it joins whatever
//! transaction or savepoint the calling use-case opened. Statements execute
//! eagerly: a constraint violation surfaces at the statement that caused it,
//! before the surrounding transaction commits.

use std::marker::PhantomData;

use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::{DbError, Session};

/// A table row type the generic CRUD can operate on.
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static {
    /// Fully qualified table name (schema.table)
    const TABLE: &'static str;

    /// Short name used in error messages
    const NAME: &'static str;

    /// Whether updates should bump an `updated_at` column
    const TRACKS_UPDATES: bool = false;
}

/// A bindable column value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i32),
    NullableInt(Option<i32>),
}

/// Column/value pairs for INSERT and UPDATE
pub type Fields = Vec<(&'static str, FieldValue)>;

fn push_value(sep: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>, value: FieldValue) {
    match value {
        FieldValue::Text(v) => sep.push_bind_unseparated(v),
        FieldValue::Int(v) => sep.push_bind_unseparated(v),
        FieldValue::NullableInt(v) => sep.push_bind_unseparated(v),
    };
}

/// CRUD operations for one entity type, bound to a session
pub struct Crud<E> {
    session: Session,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Crud<E> {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    /// The session every statement runs on.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Fetch one row by id.
    pub async fn get(&self, id: i32) -> Result<E, DbError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", E::TABLE);

        let mut state = self.session.lock().await;
        let conn = state.connection().await?;
        let row = sqlx::query_as::<_, E>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;

        row.ok_or_else(|| DbError::NotFound {
            entity: E::NAME,
            id: id.to_string(),
        })
    }

    /// Fetch rows ordered by id. Non-positive limits/offsets are ignored.
    pub async fn get_multi(&self, offset: Option<i64>, limit: Option<i64>) -> Result<Vec<E>, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT * FROM {} ORDER BY id", E::TABLE));
        if let Some(limit) = limit.filter(|l| *l > 0) {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = offset.filter(|o| *o > 0) {
            qb.push(" OFFSET ").push_bind(offset);
        }

        let mut state = self.session.lock().await;
        let conn = state.connection().await?;
        let rows = qb.build_query_as::<E>().fetch_all(conn).await?;
        Ok(rows)
    }

    /// Insert a row and return it.
    pub async fn create(&self, fields: Fields) -> Result<E, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} ", E::TABLE));
        if fields.is_empty() {
            qb.push("DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = fields.iter().map(|(c, _)| *c).collect();
            qb.push("(").push(columns.join(", ")).push(") VALUES (");
            {
                let mut sep = qb.separated(", ");
                for (_, value) in fields {
                    sep.push("");
                    push_value(&mut sep, value);
                }
            }
            qb.push(")");
        }
        qb.push(" RETURNING *");

        let mut state = self.session.lock().await;
        let conn = state.connection().await?;
        let row = qb
            .build_query_as::<E>()
            .fetch_one(conn)
            .await
            .map_err(|e| DbError::classify(e, E::NAME, false))?;

        tracing::debug!(entity = E::NAME, "Row created");
        Ok(row)
    }

    /// Update a row by id and return it; `NotFound` if the id is absent.
    ///
    /// With no fields to change the current row is returned as-is.
    pub async fn update(&self, id: i32, fields: Fields) -> Result<E, DbError> {
        if fields.is_empty() {
            return self.get(id).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", E::TABLE));
        {
            let mut sep = qb.separated(", ");
            for (column, value) in fields {
                sep.push(format!("{} = ", column));
                push_value(&mut sep, value);
            }
            if E::TRACKS_UPDATES {
                sep.push("updated_at = now()");
            }
        }
        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let mut state = self.session.lock().await;
        let conn = state.connection().await?;
        let row = qb
            .build_query_as::<E>()
            .fetch_optional(conn)
            .await
            .map_err(|e| DbError::classify(e, E::NAME, true))?;

        row.ok_or_else(|| DbError::NotFound {
            entity: E::NAME,
            id: id.to_string(),
        })
    }

    /// Delete a row by id; `NotFound` unless exactly one row went away.
    pub async fn delete(&self, id: i32) -> Result<(), DbError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", E::TABLE);

        let mut state = self.session.lock().await;
        let conn = state.connection().await?;
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(conn)
            .await
            .map_err(|e| DbError::classify(e, E::NAME, false))?;

        if result.rows_affected() != 1 {
            return Err(DbError::NotFound {
                entity: E::NAME,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
