//! cookcard-extract library interface
//!
//! Exposes the extraction ladder and HTTP surface for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod extractors;
pub mod ladder;
pub mod models;
pub mod types;
pub mod util;
pub mod validators;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use cookcard_common::ServiceConfig;
use ladder::Orchestrator;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved service configuration
    pub config: Arc<ServiceConfig>,
    /// The extraction ladder
    pub orchestrator: Arc<Orchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Arc<ServiceConfig>) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(db.clone(), config.clone()));
        Self {
            db,
            config,
            orchestrator,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::extract_routes())
        .merge(api::health_routes())
        .with_state(state)
}
