use anyhow::{Context, Result};

use template_service::db::{create_pool, migrations};
use template_service::http::run_server;
use template_service::{tracing_setup, AppContainer, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("failed to load settings")?;
    tracing_setup::init(&settings.common)?;

    tracing::info!(
        project = %settings.common.project_name,
        environment = ?settings.common.environment,
        "Starting service"
    );

    let pool = create_pool(&settings.postgres)
        .await
        .context("failed to connect to PostgreSQL")?;
    migrations::run(&pool).await.context("failed to run migrations")?;

    let container = AppContainer::new(settings, pool);
    let result = run_server(container.clone()).await;
    container.close().await;

    result.context("server error")
}
