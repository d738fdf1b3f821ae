//! The extraction ladder
//!
//! Orchestrates the tier sequence L1 → harvest → pre-gate → L3 → L4 with
//! cache lookups, quota/budget reservations, and telemetry. The ladder
//! order is fixed and auditable: tiers are a closed set sequenced by
//! explicit state transitions in the orchestrator, not by registration.

pub mod orchestrator;

pub use orchestrator::{LadderTiers, Orchestrator};

use crate::models::CookCard;

/// Why a request was gated instead of extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    /// Per-user hourly request limit hit
    RateLimited,
    /// Per-user monthly extraction quota exhausted
    QuotaExceeded,
    /// Daily vision-minute budget (user or global) exhausted
    BudgetExceeded,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::RateLimited => "rate_limited",
            GateKind::QuotaExceeded => "quota_exceeded",
            GateKind::BudgetExceeded => "budget_exceeded",
        }
    }
}

/// A request entering the ladder
#[derive(Debug, Clone)]
pub struct LadderRequest {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub user_id: String,
    pub household_id: Option<String>,
}

/// Terminal result of a ladder run
///
/// Every well-formed URL yields something renderable: either a full card,
/// or a lite card behind a gate marker. Only genuinely unexpected internal
/// errors surface as `Err` from the orchestrator.
#[derive(Debug, Clone)]
pub enum LadderOutcome {
    /// Extraction finished (full or lite-fallback card)
    Complete {
        cook_card: CookCard,
        from_cache: bool,
    },
    /// Request was gated; the lite card is still usable
    Gated {
        kind: GateKind,
        message: String,
        cook_card: CookCard,
    },
}

/// Ordered record of the tiers that contributed to a card
#[derive(Debug, Clone, Default)]
pub struct LadderPath(Vec<&'static str>);

impl LadderPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tier: &'static str) {
        self.0.push(tier);
    }

    pub fn as_string(&self) -> String {
        self.0.join("→")
    }
}

// ============================================================================
// Tests
// ============================================================================
