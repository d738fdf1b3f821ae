//! Quota & budget ledger
//!
//! Atomic counters over the `usage_counters` table. A reservation is a
//! single conditional UPDATE (`value = value + amount WHERE value + amount
//! <= limit`), so two concurrent requests can never both slip under a limit
//! the way separate check-then-increment round trips allow.
//!
//! Callers treat any store error as a denial (fail-closed): over-spending
//! is asymmetric with an occasional false rate-limit.

use chrono::{DateTime, Utc};
use cookcard_common::Result;
use sqlx::SqlitePool;

/// User id under which the global daily vision budget is tracked
pub const GLOBAL_USER_ID: &str = "__global__";

/// Counter dimensions tracked by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Extraction requests per user per hour
    HourlyRate,
    /// Extractions per user per month
    MonthlyQuota,
    /// Vision minutes per user per day (L4 only)
    DailyL4User,
    /// Vision minutes across all users per day (L4 only)
    DailyL4Global,
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::HourlyRate => "hourly_rate",
            CounterKind::MonthlyQuota => "monthly_quota",
            CounterKind::DailyL4User => "daily_l4_user",
            CounterKind::DailyL4Global => "daily_l4_global",
        }
    }

    /// Window key for this dimension at the given instant
    pub fn window_key(&self, now: DateTime<Utc>) -> String {
        match self {
            CounterKind::HourlyRate => now.format("%Y-%m-%dT%H").to_string(),
            CounterKind::MonthlyQuota => now.format("%Y-%m").to_string(),
            CounterKind::DailyL4User | CounterKind::DailyL4Global => {
                now.format("%Y-%m-%d").to_string()
            }
        }
    }
}

/// Atomically reserve `amount` against `limit`
///
/// Returns `true` when the reservation was granted. The grant decision is
/// made entirely inside one conditional UPDATE; the preceding insert only
/// materializes a zero row for the window.
pub async fn reserve(
    db: &SqlitePool,
    user_id: &str,
    kind: CounterKind,
    now: DateTime<Utc>,
    amount: f64,
    limit: f64,
) -> Result<bool> {
    let window_key = kind.window_key(now);

    sqlx::query(
        "INSERT INTO usage_counters (user_id, counter_type, window_key, value)
         VALUES (?1, ?2, ?3, 0.0)
         ON CONFLICT (user_id, counter_type, window_key) DO NOTHING",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(&window_key)
    .execute(db)
    .await?;

    let result = sqlx::query(
        "UPDATE usage_counters
         SET value = value + ?4
         WHERE user_id = ?1 AND counter_type = ?2 AND window_key = ?3
           AND value + ?4 <= ?5",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(&window_key)
    .bind(amount)
    .bind(limit)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release (refund) a previously granted reservation
///
/// Floors at zero; releasing more than was reserved never drives a counter
/// negative.
pub async fn release(
    db: &SqlitePool,
    user_id: &str,
    kind: CounterKind,
    now: DateTime<Utc>,
    amount: f64,
) -> Result<()> {
    let window_key = kind.window_key(now);

    sqlx::query(
        "UPDATE usage_counters
         SET value = MAX(value - ?4, 0.0)
         WHERE user_id = ?1 AND counter_type = ?2 AND window_key = ?3",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(&window_key)
    .bind(amount)
    .execute(db)
    .await?;

    Ok(())
}

/// Current counter value for the window (0.0 when no row exists)
pub async fn peek(
    db: &SqlitePool,
    user_id: &str,
    kind: CounterKind,
    now: DateTime<Utc>,
) -> Result<f64> {
    let window_key = kind.window_key(now);

    let row: Option<(f64,)> = sqlx::query_as(
        "SELECT value FROM usage_counters
         WHERE user_id = ?1 AND counter_type = ?2 AND window_key = ?3",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(&window_key)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|(v,)| v).unwrap_or(0.0))
}

// ============================================================================
// Tests
// ============================================================================
