//! Database connection pool management
//!
//! The pool is the application-scoped resource: created once at startup,
//! shared by every request session, closed at shutdown.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::PostgresSettings;

/// Create a PostgreSQL connection pool from settings.
///
/// At most `pool_size + overflow_pool_size` physical connections are opened;
/// `pool_size` of them are kept warm. Connections are health-checked before
/// being handed out.
///
/// # Errors
///
/// Returns an error if the options are invalid or the first connection fails.
pub async fn create_pool(settings: &PostgresSettings) -> Result<PgPool, sqlx::Error> {
    pool_options(settings)
        .connect_with(settings.connect_options()?)
        .await
}

/// Create a pool that connects on first use.
///
/// Used by tests and tools that may never touch the database.
pub fn create_lazy_pool(settings: &PostgresSettings) -> Result<PgPool, sqlx::Error> {
    Ok(pool_options(settings)
        .min_connections(0)
        .connect_lazy_with(settings.connect_options()?))
}

fn pool_options(settings: &PostgresSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(settings.pool_size)
        .max_connections(settings.max_connections())
        .acquire_timeout(settings.acquire_timeout)
        .test_before_acquire(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn settings() -> PostgresSettings {
        Settings::from_lookup(|key| match key {
            "COMMON__ENVIRONMENT" => Some("test".into()),
            "DATABASE_URL" => std::env::var("DATABASE_URL").ok(),
            _ => None,
        })
        .unwrap()
        .postgres
    }

    #[tokio::test]
    async fn lazy_pool_does_not_connect() {
        let pool = create_lazy_pool(&settings()).expect("lazy pool");
        assert_eq!(pool.size(), 0);
    }

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p template-service -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pool_acquires_connection() {
        let pool = create_pool(&settings()).await.expect("pool creation failed");

        let result: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");

        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn concurrent_pool_access() {
        let pool = create_pool(&settings()).await.expect("pool creation failed");

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let result: (i32,) = sqlx::query_as("SELECT $1::int")
                        .bind(i)
                        .fetch_one(&pool)
                        .await
                        .expect("concurrent query failed");
                    result.0
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.await.expect("task panicked");
            assert_eq!(result, i as i32);
        }
    }
}
