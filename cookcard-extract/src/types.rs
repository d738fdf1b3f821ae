//! Core types and trait definitions for the extraction ladder
//!
//! Defines the uniform interfaces behind which the ladder tiers sit:
//! - `TierExtractor` — ingredient-producing tiers (L1 metadata, L3 text LLM,
//!   L4 video vision)
//! - `TextHarvester` — source-text harvesters (description, comments,
//!   transcript) that feed the pre-gate and the L3 prompt
//!
//! The tier set is closed and the ladder order is fixed; dispatch happens
//! through explicit orchestrator transitions, never open-ended registration.

use crate::models::{Ingredient, Provenance};
use std::time::Duration;
use thiserror::Error;

/// Evidence available to a tier at the moment it runs
///
/// Accumulated as the ladder progresses: the orchestrator fills in metadata
/// after L1 and appends harvested text before the pre-gate.
#[derive(Debug, Clone)]
pub struct EvidenceContext {
    /// Normalized source URL
    pub url: String,
    /// Requesting user (for logging and ledger dimensions)
    pub user_id: String,
    /// Title supplied by the client or recovered by L1
    pub title: Option<String>,
    /// Description supplied by the client or harvested from the platform
    pub description: Option<String>,
    /// Concatenated harvested source text (description, comments, transcript)
    pub source_text: String,
    /// Whether the URL points at video content
    pub is_video: bool,
    /// Video duration in seconds, when known
    pub video_duration_seconds: Option<f64>,
}

/// Link metadata recovered by the cheap L1 tier
#[derive(Debug, Clone, Default)]
pub struct SourceMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub image_url: Option<String>,
    /// Video duration in seconds, when the platform reports one
    pub duration_seconds: Option<f64>,
    /// Whether the platform reports the link as video content
    pub is_video: Option<bool>,
}

/// Result of running a single tier
#[derive(Debug, Clone, Default)]
pub struct TierOutcome {
    /// Link metadata (L1 only)
    pub metadata: Option<SourceMetadata>,
    /// Candidate ingredients, pre-validation
    pub ingredients: Vec<Ingredient>,
    /// Tier-level confidence (0.0-1.0)
    pub confidence: f32,
    /// Actual cost in provider-reported usage units
    pub cost_units: f64,
    /// Local estimate, logged as a discrepancy signal when it diverges
    pub estimated_cost_units: Option<f64>,
}

/// Ingredient-producing extraction tier
#[async_trait::async_trait]
pub trait TierExtractor: Send + Sync {
    /// Tier name for logging and ladder-path tracking ("L1", "L3", "L4")
    fn name(&self) -> &'static str;

    /// Provenance tag stamped on ingredients this tier produces
    fn provenance(&self) -> Provenance;

    /// Run the tier against the evidence gathered so far
    ///
    /// # Errors
    /// Tier failures are non-fatal to the request; the orchestrator falls
    /// through to the next tier or the lite card.
    async fn extract(&self, ctx: &EvidenceContext) -> Result<TierOutcome, ExtractError>;
}

/// Which harvest source a `TextHarvester` reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceSource {
    Description,
    Comments,
    Transcript,
}

impl EvidenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceSource::Description => "description",
            EvidenceSource::Comments => "comments",
            EvidenceSource::Transcript => "transcript",
        }
    }
}

/// Text recovered from one harvest source
#[derive(Debug, Clone)]
pub struct HarvestedText {
    pub source: EvidenceSource,
    pub text: String,
    /// Highest score among contributing comments (comments source only)
    pub top_comment_score: Option<i64>,
}

/// Source-text harvester (L2 description/comments, L2.5 transcript)
#[async_trait::async_trait]
pub trait TextHarvester: Send + Sync {
    /// Which source this harvester reads
    fn source(&self) -> EvidenceSource;

    /// Fetch text for the given URL; empty text is a valid (miss) result
    async fn harvest(&self, ctx: &EvidenceContext) -> Result<HarvestedText, ExtractError>;
}

/// Tier extraction error
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Network communication failure (transient)
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its hard timeout (transient)
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Provider asked us to back off (transient, honors Retry-After)
    #[error("Provider rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Provider returned an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a provider response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Tier cannot run with the available evidence
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Whether a retry could plausibly succeed
    ///
    /// Client/validation errors (4xx, parse failures) are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractError::Network(_) | ExtractError::Timeout(_) => true,
            ExtractError::RateLimited { .. } => true,
            ExtractError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-supplied retry delay, when one was given
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExtractError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Map a reqwest error, distinguishing timeouts from other failures
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExtractError::Timeout(e.to_string())
        } else {
            ExtractError::Network(e.to_string())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
