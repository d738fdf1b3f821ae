//! Provider usage and cost accounting types
//!
//! Cost is always reported from the provider's actual usage figures; local
//! character-count estimates exist only as a discrepancy signal and are
//! never charged against quotas or budgets.

use serde::{Deserialize, Serialize};

/// Actual usage reported by a hosted model provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    /// Vision-minutes consumed (multimodal tier only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_minutes: Option<f64>,
}

impl ProviderUsage {
    /// Cost in abstract units: 1 unit per 1k tokens, or per vision-minute
    pub fn cost_units(&self) -> f64 {
        if let Some(minutes) = self.video_minutes {
            minutes
        } else {
            self.total_tokens as f64 / 1000.0
        }
    }
}

/// Relative divergence between an estimate and the actual figure
///
/// Returns 0.0 when the actual value is zero (nothing to compare against).
pub fn estimate_divergence(estimated: f64, actual: f64) -> f64 {
    if actual == 0.0 {
        return 0.0;
    }
    ((estimated - actual) / actual).abs()
}

/// Whether an estimate diverges from actual usage enough to flag (>20%)
pub fn estimate_diverges(estimated: f64, actual: f64) -> bool {
    estimate_divergence(estimated, actual) > 0.20
}

// ============================================================================
// Tests
// ============================================================================
