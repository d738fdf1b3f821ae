//! Telemetry sink
//!
//! Append-only event log of ladder decisions for offline analysis. The
//! ladder never reads these rows; recording failures are logged and
//! swallowed so observability can never fail a request.

use chrono::Utc;
use cookcard_common::Result;
use sqlx::SqlitePool;
use tracing::warn;

/// Ladder decision event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    CacheHit,
    ExtractionCompleted,
    RateLimited,
    QuotaExceeded,
    BudgetExceeded,
    TierFailed,
    CostDiscrepancy,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CacheHit => "cache_hit",
            EventType::ExtractionCompleted => "extraction_completed",
            EventType::RateLimited => "rate_limited",
            EventType::QuotaExceeded => "quota_exceeded",
            EventType::BudgetExceeded => "budget_exceeded",
            EventType::TierFailed => "tier_failed",
            EventType::CostDiscrepancy => "cost_discrepancy",
        }
    }
}

/// One immutable ladder decision record
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub user_id: String,
    pub event_type: EventType,
    pub ladder_path: Option<String>,
    pub evidence_source: Option<String>,
    pub cost_units: f64,
    pub latency_ms: i64,
    pub error: Option<String>,
}

impl TelemetryEvent {
    pub fn new(user_id: &str, event_type: EventType) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_type,
            ladder_path: None,
            evidence_source: None,
            cost_units: 0.0,
            latency_ms: 0,
            error: None,
        }
    }

    pub fn ladder_path(mut self, path: impl Into<String>) -> Self {
        self.ladder_path = Some(path.into());
        self
    }

    pub fn evidence_source(mut self, source: impl Into<String>) -> Self {
        self.evidence_source = Some(source.into());
        self
    }

    pub fn cost_units(mut self, cost: f64) -> Self {
        self.cost_units = cost;
        self
    }

    pub fn latency_ms(mut self, latency: i64) -> Self {
        self.latency_ms = latency;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Append one event row
pub async fn record(db: &SqlitePool, event: &TelemetryEvent) -> Result<()> {
    sqlx::query(
        "INSERT INTO telemetry_events
             (user_id, event_type, ladder_path, evidence_source, cost_units, latency_ms, error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&event.user_id)
    .bind(event.event_type.as_str())
    .bind(&event.ladder_path)
    .bind(&event.evidence_source)
    .bind(event.cost_units)
    .bind(event.latency_ms)
    .bind(&event.error)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    Ok(())
}

/// Append one event row, swallowing failures with a warning
pub async fn emit(db: &SqlitePool, event: TelemetryEvent) {
    if let Err(e) = record(db, &event).await {
        warn!(
            event_type = event.event_type.as_str(),
            error = %e,
            "Failed to record telemetry event"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
