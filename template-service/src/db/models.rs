//! Row types for the two persisted tables

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::Entity;

/// Role record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Role {
    pub id: i32,
    pub role_name: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Role {
    const TABLE: &'static str = "template_schema.template_user_role";
    const NAME: &'static str = "template_user_role";
}

/// User record from database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i32,
    pub user_name: String,
    pub role_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for User {
    const TABLE: &'static str = "template_schema.template_user";
    const NAME: &'static str = "template_user";
    const TRACKS_UPDATES: bool = true;
}
