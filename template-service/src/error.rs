//! Application errors and their HTTP translation
//!
//! Every failure reaching a handler boundary becomes an [`AppError`], and
//! `IntoResponse for AppError` is the only place that turns errors into wire
//! format: `{"message": "...", "code": "..."}`.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::DbError;
use crate::schemas::ValidationError;

/// Machine-readable error code sent in the `code` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InternalError,
    BadRequest,
    InvalidValue,
    Unauthorized,
    TokenExpired,
    Forbidden,
    InvalidRefreshToken,
    AuthenticationRequiredError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InternalError => "internal_error",
            Self::BadRequest => "bad_request",
            Self::InvalidValue => "invalid_value",
            Self::Unauthorized => "unauthorized",
            Self::TokenExpired => "token_expired",
            Self::Forbidden => "forbidden",
            Self::InvalidRefreshToken => "invalid_refresh_token",
            Self::AuthenticationRequiredError => "authentication_required_error",
        }
    }
}

/// Error envelope returned to clients
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: ErrorCode,
}

/// Application error with automatic HTTP status mapping
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Request failed validation (422)
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Credentials missing or wrong (401)
    #[error("authentication failed: {message}")]
    Authentication { message: String, code: ErrorCode },

    /// Entity (or referenced entity) does not exist (404)
    #[error("{message}")]
    NotFound { message: String },

    /// Unique or foreign-key constraint rejected the write (409)
    #[error("{message}")]
    Conflict { message: String },

    /// Unclassified database failure (500, logged)
    #[error("database error: {0}")]
    Database(DbError),

    /// Generic application failure (500, logged)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            code: ErrorCode::Unauthorized,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::BadRequest,
            Self::Authentication { code, .. } => *code,
            _ => ErrorCode::InternalError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            Self::Validation { message } | Self::NotFound { message } | Self::Conflict { message } => {
                tracing::warn!(status = status.as_u16(), "{}", message);
                message.clone()
            }
            Self::Authentication { message, .. } => {
                tracing::warn!("Authentication error: {}", message);
                format!("Authentication error: {}", message)
            }
            Self::Database(e) => {
                // Log the actual error, return generic message
                tracing::error!("Database error: {}", e);
                "an internal error occurred".to_string()
            }
            Self::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                message.clone()
            }
        };

        let mut response = (status, Json(ErrorBody { message, code })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Basic"));
        }
        response
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        Self::validation(e.to_string())
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { entity, id } => Self::NotFound {
                message: format!("{} record {} not found", entity, id),
            },
            DbError::UniqueViolation { entity } => Self::Conflict {
                message: format!("Fields passed to {} contain non-unique values", entity),
            },
            DbError::ForeignKeyViolation { on_update: false, .. } => Self::Conflict {
                message: "Attempted to link fields to non-existent foreign key values".into(),
            },
            DbError::ForeignKeyViolation { on_update: true, entity } => Self::NotFound {
                message: format!(
                    "Attempted to attach a foreign key of {} to a row that does not exist",
                    entity
                ),
            },
            other => Self::Database(other),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::from(DbError::from(e))
    }
}
