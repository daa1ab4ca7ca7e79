use anyhow::Result;
use axum::Router;
use medicart_orderservice::{
    app_state::AppState,
    bootstrap::{self, bootstrap},
    config, db, routes, swagger,
};

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    bootstrap::init_tracing();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(db::MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let db_pool = db::create_pool(&config.database).await?;
    let state = AppState::new(db_pool, &config);

    let (router, mut openapi) = routes::routes_with_openapi().split_for_parts();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("MediCart OrderService API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi)?;

    let app = Router::new()
        .merge(router.with_state(state))
        .merge(swagger_ui);

    tracing::info!("Bootstrapping...");
    bootstrap("OrderService", app, &config.server).await?;
    Ok(())
}
