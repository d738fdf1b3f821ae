//! Extraction cache
//!
//! Content-addressed store from a (url, title, description) fingerprint to
//! a previously computed Cook Card. The extraction format version is baked
//! into the key, so a schema bump invalidates every prior row without a
//! migration: old keys simply never hit again.
//!
//! TTL expiry is a read-time check; there is no eviction sweep.

use crate::models::{CookCard, EXTRACTION_FORMAT_VERSION};
use chrono::{DateTime, Duration, Utc};
use cookcard_common::Result;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::warn;

/// A cached extraction with the cost originally incurred
#[derive(Debug, Clone)]
pub struct CachedExtraction {
    pub cook_card: CookCard,
    pub cost_units: f64,
}

/// Derive the cache key for a request fingerprint
///
/// SHA-256 over the normalized URL, title, description, and the extraction
/// format version constant.
pub fn cache_key(normalized_url: &str, title: Option<&str>, description: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    hasher.update([0x1f]);
    hasher.update(title.unwrap_or("").as_bytes());
    hasher.update([0x1f]);
    hasher.update(description.unwrap_or("").as_bytes());
    hasher.update([0x1f]);
    hasher.update(EXTRACTION_FORMAT_VERSION.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Look up a cached Cook Card
///
/// Rows older than `ttl_days` miss. An undeserializable row is treated as
/// a miss with a warning rather than failing the request.
pub async fn get(db: &SqlitePool, key: &str, ttl_days: i64) -> Result<Option<CachedExtraction>> {
    let row: Option<(String, f64, String)> = sqlx::query_as(
        "SELECT cook_card, cost_units, created_at FROM extraction_cache WHERE cache_key = ?1",
    )
    .bind(key)
    .fetch_optional(db)
    .await?;

    let Some((card_json, cost_units, created_at)) = row else {
        return Ok(None);
    };

    let created_at = match created_at.parse::<DateTime<Utc>>() {
        Ok(ts) => ts,
        Err(e) => {
            warn!(key, error = %e, "Unparseable cache timestamp, treating as miss");
            return Ok(None);
        }
    };

    if Utc::now().signed_duration_since(created_at) > Duration::days(ttl_days) {
        return Ok(None);
    }

    match serde_json::from_str::<CookCard>(&card_json) {
        Ok(cook_card) => Ok(Some(CachedExtraction {
            cook_card,
            cost_units,
        })),
        Err(e) => {
            warn!(key, error = %e, "Unparseable cache row, treating as miss");
            Ok(None)
        }
    }
}

/// Store a Cook Card (successful or lite) against its fingerprint
pub async fn put(db: &SqlitePool, key: &str, cook_card: &CookCard, cost_units: f64) -> Result<()> {
    let card_json = serde_json::to_string(cook_card)
        .map_err(|e| cookcard_common::Error::Internal(format!("Serialize cook card: {}", e)))?;

    sqlx::query(
        "INSERT INTO extraction_cache (cache_key, cook_card, cost_units, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (cache_key) DO UPDATE SET
             cook_card = excluded.cook_card,
             cost_units = excluded.cost_units,
             created_at = excluded.created_at",
    )
    .bind(key)
    .bind(card_json)
    .bind(cost_units)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
