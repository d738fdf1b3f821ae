//! Cook Card data model
//!
//! The structured extraction result for a recipe URL: title, creator, image,
//! and a provenance-tagged ingredient list with per-ingredient confidence.
//!
//! # Invariants
//! - `ingredients` is empty only when every tier failed; the card then
//!   carries `method = "lite"` and clients degrade to title/image rendering.
//! - Every ingredient on a non-lite card has a provenance tag and a dense,
//!   zero-based position index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extraction format version
///
/// Baked into every cache key so a schema change invalidates prior cache
/// rows without a migration: old keys simply never hit again.
pub const EXTRACTION_FORMAT_VERSION: u32 = 3;

/// Source platform for a shared recipe link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Tiktok,
    Youtube,
    Facebook,
    Web,
}

impl Platform {
    /// Classify a normalized URL by host
    pub fn from_url(url: &str) -> Self {
        let host = url
            .split("://")
            .nth(1)
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or("");
        if host.ends_with("instagram.com") {
            Platform::Instagram
        } else if host.ends_with("tiktok.com") {
            Platform::Tiktok
        } else if host.ends_with("youtube.com") || host.ends_with("youtu.be") {
            Platform::Youtube
        } else if host.ends_with("facebook.com") || host.ends_with("fb.watch") {
            Platform::Facebook
        } else {
            Platform::Web
        }
    }

    /// Whether this platform primarily hosts video content
    pub fn is_video_platform(&self) -> bool {
        matches!(self, Platform::Tiktok | Platform::Youtube)
    }
}

/// Which evidence source produced an ingredient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Oembed,
    Description,
    Comment,
    Transcript,
    LlmText,
    VideoVision,
}

/// How the card as a whole was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Metadata only; every ingredient tier failed or was gated
    Lite,
    /// Text-completion model over harvested source text (L3)
    LlmText,
    /// Multimodal model over the video itself (L4)
    VideoVision,
}

/// A single extracted ingredient with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Raw name as extracted
    pub name: String,
    /// Normalized (lowercased, trimmed, de-quantified) name
    pub normalized_name: String,
    /// Canonical-catalog reference, when a close match exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation: Option<String>,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
    /// Which tier/source produced this ingredient
    pub provenance: Provenance,
    /// Dense, zero-based position within the card
    pub position: usize,
    /// Section label (e.g. "For the sauce"), when present in the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Literal source-text substring that justified this ingredient
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_phrase: Option<String>,
    /// Score of the harvested comment this ingredient came from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_score: Option<i64>,
}

/// Extraction metadata attached to every card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMeta {
    /// How the card was produced
    pub method: ExtractionMethod,
    /// Overall confidence: mean of per-ingredient confidences (0.0 for lite)
    pub confidence: f32,
    /// Format version at extraction time
    pub format_version: u32,
    /// Total cost in provider usage units
    pub cost_units: f64,
    /// Extraction timestamp
    pub extracted_at: DateTime<Utc>,
}

/// The extraction result for a recipe URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookCard {
    /// Normalized source URL
    pub source_url: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_minutes: Option<u32>,
    /// Ordered ingredient list (position indices are dense and zero-based)
    pub ingredients: Vec<Ingredient>,
    pub extraction: ExtractionMeta,
}

impl CookCard {
    /// Overall confidence as the mean of per-ingredient confidences
    ///
    /// An empty ingredient list yields 0.0 rather than dividing by zero.
    pub fn mean_ingredient_confidence(ingredients: &[Ingredient]) -> f32 {
        if ingredients.is_empty() {
            return 0.0;
        }
        let sum: f32 = ingredients.iter().map(|i| i.confidence).sum();
        sum / ingredients.len() as f32
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_url() {
        assert_eq!(
            Platform::from_url("https://www.instagram.com/reel/abc/"),
            Platform::Instagram
        );
        assert_eq!(
            Platform::from_url("https://www.tiktok.com/@cook/video/123"),
            Platform::Tiktok
        );
        assert_eq!(
            Platform::from_url("https://youtu.be/xyz"),
            Platform::Youtube
        );
        assert_eq!(Platform::from_url("https://example.com/recipe"), Platform::Web);
    }

    #[test]
    fn test_mean_confidence_empty_is_zero() {
        assert_eq!(CookCard::mean_ingredient_confidence(&[]), 0.0);
    }

    #[test]
    fn test_provenance_serializes_snake_case() {
        let json = serde_json::to_string(&Provenance::VideoVision).unwrap();
        assert_eq!(json, "\"video_vision\"");
        let json = serde_json::to_string(&Provenance::LlmText).unwrap();
        assert_eq!(json, "\"llm_text\"");
    }

    #[test]
    fn test_method_serializes_snake_case() {
        let json = serde_json::to_string(&ExtractionMethod::Lite).unwrap();
        assert_eq!(json, "\"lite\"");
    }
}
