//! Database access for cookcard-extract
//!
//! Single shared SQLite pool holding the three ladder tables:
//! - `extraction_cache` — content-addressed Cook Card cache rows
//! - `usage_counters` — atomic quota/budget counters
//! - `telemetry_events` — append-only ladder decision log

pub mod cache;
pub mod ledger;
pub mod telemetry;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to the configured SQLite file, creating it (and its parent
/// directory) when missing, then ensures the ladder tables exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create ladder tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extraction_cache (
            cache_key TEXT PRIMARY KEY,
            cook_card TEXT NOT NULL,
            cost_units REAL NOT NULL DEFAULT 0.0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usage_counters (
            user_id TEXT NOT NULL,
            counter_type TEXT NOT NULL,
            window_key TEXT NOT NULL,
            value REAL NOT NULL DEFAULT 0.0,
            PRIMARY KEY (user_id, counter_type, window_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS telemetry_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            ladder_path TEXT,
            evidence_source TEXT,
            cost_units REAL NOT NULL DEFAULT 0.0,
            latency_ms INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (extraction_cache, usage_counters, telemetry_events)");

    Ok(())
}

/// In-memory pool for tests
///
/// Pinned to a single connection: each `:memory:` connection is otherwise
/// its own database.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    pool
}
