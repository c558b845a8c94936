//! Database error type and constraint classification

/// PostgreSQL SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL SQLSTATE for foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {entity} '{id}'")]
    NotFound { entity: &'static str, id: String },

    #[error("unique constraint violated on {entity}")]
    UniqueViolation { entity: &'static str },

    #[error("foreign key constraint violated on {entity}")]
    ForeignKeyViolation { entity: &'static str, on_update: bool },

    #[error("no active transaction on this session")]
    NoTransaction,

    #[error("session already closed")]
    SessionClosed,
}

impl DbError {
    /// Classify a write failure by the database's native error code.
    ///
    /// Unique and foreign-key violations become typed variants; anything else
    /// stays a raw sqlx error.
    pub fn classify(err: sqlx::Error, entity: &'static str, on_update: bool) -> Self {
        let code = match &err {
            sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
            _ => None,
        };

        match code.as_deref() {
            Some(UNIQUE_VIOLATION) => Self::UniqueViolation { entity },
            Some(FOREIGN_KEY_VIOLATION) => Self::ForeignKeyViolation { entity, on_update },
            _ => Self::Sqlx(err),
        }
    }
}
