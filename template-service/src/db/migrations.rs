//! Schema migrations for the role and user tables
//!
//! Every statement is idempotent, so running on each start is safe.

use sqlx::PgPool;

use super::DbError;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "create schema",
        "CREATE SCHEMA IF NOT EXISTS template_schema",
    ),
    (
        "create template_user_role",
        r#"
        CREATE TABLE IF NOT EXISTS template_schema.template_user_role (
            id SERIAL PRIMARY KEY,
            role_name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ),
    (
        "create template_user",
        r#"
        CREATE TABLE IF NOT EXISTS template_schema.template_user (
            id SERIAL PRIMARY KEY,
            user_name TEXT NOT NULL UNIQUE,
            role_id INTEGER REFERENCES template_schema.template_user_role(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ DEFAULT now()
        )
        "#,
    ),
    (
        "index template_user.role_id",
        "CREATE INDEX IF NOT EXISTS idx_template_user_role_id ON template_schema.template_user (role_id)",
    ),
];

/// Run all migrations in a single transaction
pub async fn run(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("Running migrations...");

    let mut tx = pool.begin().await?;
    for (name, sql) in MIGRATIONS {
        tracing::debug!(migration = name, "Applying");
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!(count = MIGRATIONS.len(), "Migrations complete");
    Ok(())
}
