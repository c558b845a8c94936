//! Request schemas with validation at construction
//!
//! Raw request bodies deserialize into the `*Schema` types; `validate()` turns
//! them into the validated inputs the use-cases accept. Invalid input returns
//! [`ValidationError`], which the error layer maps to 422.

use std::fmt;

use serde::Deserialize;

use crate::db::{FieldValue, Fields};

/// Maximum length for role and user names
const MAX_NAME_LEN: usize = 255;

/// Minimum length for user names
const MIN_USER_NAME_LEN: usize = 6;

/// Validation error for request schemas
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is empty when it shouldn't be
    Empty { field: &'static str },

    /// Field is shorter than allowed
    TooShort { field: &'static str, min: usize },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// Numeric field outside its allowed range
    OutOfRange { field: &'static str, reason: &'static str },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} cannot be empty", field),
            Self::TooShort { field, min } => {
                write!(f, "{} must be at least {} characters", field, min)
            }
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::OutOfRange { field, reason } => write!(f, "{}: {}", field, reason),
        }
    }
}

impl std::error::Error for ValidationError {}

fn validate_name(field: &'static str, value: &str, min: usize) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let len = value.chars().count();
    if len < min {
        return Err(ValidationError::TooShort { field, min });
    }
    if len > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_NAME_LEN,
        });
    }
    Ok(value.to_owned())
}

fn validate_id(field: &'static str, value: i32) -> Result<i32, ValidationError> {
    if value < 1 {
        return Err(ValidationError::OutOfRange {
            field,
            reason: "must be a positive integer",
        });
    }
    Ok(value)
}

/// POST /api/v1/roles body
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoleSchema {
    pub role_name: String,
}

/// Validated role creation input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub role_name: String,
}

impl CreateRoleSchema {
    pub fn validate(self) -> Result<NewRole, ValidationError> {
        Ok(NewRole {
            role_name: validate_name("role_name", &self.role_name, 1)?,
        })
    }
}

impl NewRole {
    pub fn into_fields(self) -> Fields {
        vec![("role_name", FieldValue::Text(self.role_name))]
    }
}

/// POST /api/v1/users body
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserSchema {
    pub user_name: String,
    pub role_id: i32,
}

/// Validated user creation input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub user_name: String,
    pub role_id: i32,
}

impl CreateUserSchema {
    pub fn validate(self) -> Result<NewUser, ValidationError> {
        Ok(NewUser {
            user_name: validate_name("user_name", &self.user_name, MIN_USER_NAME_LEN)?,
            role_id: validate_id("role_id", self.role_id)?,
        })
    }
}

impl NewUser {
    pub fn into_fields(self) -> Fields {
        vec![
            ("user_name", FieldValue::Text(self.user_name)),
            ("role_id", FieldValue::NullableInt(Some(self.role_id))),
        ]
    }
}

/// PATCH /api/v1/users/{id} body; absent fields stay unchanged
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserSchema {
    pub user_name: Option<String>,
    pub role_id: Option<i32>,
}

/// Validated partial user update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub user_name: Option<String>,
    pub role_id: Option<i32>,
}

impl UpdateUserSchema {
    pub fn validate(self) -> Result<UserChanges, ValidationError> {
        Ok(UserChanges {
            user_name: self
                .user_name
                .map(|n| validate_name("user_name", &n, MIN_USER_NAME_LEN))
                .transpose()?,
            role_id: self.role_id.map(|id| validate_id("role_id", id)).transpose()?,
        })
    }
}

impl UserChanges {
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        if let Some(name) = self.user_name {
            fields.push(("user_name", FieldValue::Text(name)));
        }
        if let Some(role_id) = self.role_id {
            fields.push(("role_id", FieldValue::NullableInt(Some(role_id))));
        }
        fields
    }
}

/// Query parameters for list endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListParams {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated paging window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl ListParams {
    pub fn validate(self) -> Result<Page, ValidationError> {
        if self.offset.is_some_and(|o| o < 0) {
            return Err(ValidationError::OutOfRange {
                field: "offset",
                reason: "must not be negative",
            });
        }
        if self.limit.is_some_and(|l| l < 0) {
            return Err(ValidationError::OutOfRange {
                field: "limit",
                reason: "must not be negative",
            });
        }
        Ok(Page {
            offset: self.offset,
            limit: self.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_name_is_trimmed() {
        let role = CreateRoleSchema {
            role_name: "  admin ".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(role.role_name, "admin");
    }

    #[test]
    fn rejects_empty_role_name() {
        let err = CreateRoleSchema {
            role_name: "   ".into(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, ValidationError::Empty { field: "role_name" });
    }

    #[test]
    fn user_name_minimum_length() {
        let err = CreateUserSchema {
            user_name: "bob".into(),
            role_id: 1,
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooShort {
                field: "user_name",
                min: 6
            }
        );

        assert!(CreateUserSchema {
            user_name: "bobby1".into(),
            role_id: 1
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn max_length() {
        let long = "a".repeat(256);
        let err = CreateRoleSchema { role_name: long }.validate().unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 255, .. }));
    }

    #[test]
    fn role_id_must_be_positive() {
        let err = CreateUserSchema {
            user_name: "someone".into(),
            role_id: 0,
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "role_id", .. }));
    }

    #[test]
    fn partial_update_only_sets_given_fields() {
        let changes = UpdateUserSchema {
            user_name: None,
            role_id: Some(3),
        }
        .validate()
        .unwrap();
        assert_eq!(
            changes.into_fields(),
            vec![("role_id", FieldValue::NullableInt(Some(3)))]
        );

        assert!(UpdateUserSchema::default().validate().unwrap().into_fields().is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<CreateRoleSchema, _> =
            serde_json::from_str(r#"{"role_name": "x", "extra": 1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn negative_paging_rejected() {
        let err = ListParams {
            offset: Some(-1),
            limit: None,
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "offset", .. }));
    }

    #[test]
    fn error_display() {
        let err = ValidationError::TooShort {
            field: "user_name",
            min: 6,
        };
        assert_eq!(err.to_string(), "user_name must be at least 6 characters");
    }
}
