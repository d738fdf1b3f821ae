//! cookcard-extract - Cook Card extraction service
//!
//! Turns shared social-media recipe URLs into structured Cook Cards through
//! an escalating extraction ladder with per-user quotas and a shared vision
//! budget.

use anyhow::Result;
use cookcard_common::ServiceConfig;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cookcard_extract::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting cookcard-extract service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ServiceConfig::load()?);
    info!("Database: {}", config.database_path.display());

    let db_pool = cookcard_extract::db::init_database_pool(&config.database_path).await?;
    info!("Database connection established");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(db_pool, config);
    let app = cookcard_extract::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
