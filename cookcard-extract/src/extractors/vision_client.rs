//! Video-vision extraction client (L4)
//!
//! Sends the raw video reference to a hosted multimodal model. The most
//! expensive tier: it runs only behind a successful vision-minute budget
//! reservation, and the orchestrator refunds the reservation on failure.
//!
//! Vision ingredients carry the same required fields as text-path
//! ingredients (normalized name, provenance, dense position index); the
//! shared normalizer enforces this downstream.

use crate::extractors::llm_client::IngredientListPayload;
use crate::extractors::{error_for_status, retry::with_retries};
use crate::models::{ProviderUsage, Provenance};
use crate::types::{EvidenceContext, ExtractError, TierExtractor, TierOutcome};
use async_trait::async_trait;
use cookcard_common::config::{LlmProviderConfig, RetryConfig};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Base confidence for vision candidates
const BASE_CONFIDENCE: f32 = 0.75;

/// Vision extraction prompt
const VISION_PROMPT: &str = "Watch this cooking video and list every ingredient shown or \
mentioned. Respond with JSON only: {\"ingredients\": [{\"name\": string, \
\"amount\": number|null, \"unit\": string|null, \"preparation\": string|null, \
\"section\": string|null}]}. List ingredients in order of first appearance. Do not \
invent ingredients that are not shown or spoken.";

/// Hosted multimodal extraction client
pub struct VisionClient {
    http_client: Client,
    config: LlmProviderConfig,
    retry: RetryConfig,
}

impl VisionClient {
    pub fn new(config: &LlmProviderConfig, retry: RetryConfig) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            config: config.clone(),
            retry,
        }
    }

    async fn analyze(&self, video_url: &str) -> Result<VisionResponse, ExtractError> {
        let body = json!({
            "model": self.config.model,
            "video_url": video_url,
            "prompt": VISION_PROMPT,
        });

        let mut request = self.http_client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(ExtractError::from_reqwest)?;
        let response = error_for_status(response).await?;
        response
            .json::<VisionResponse>()
            .await
            .map_err(|e| ExtractError::Parse(format!("Vision response: {}", e)))
    }
}

#[async_trait]
impl TierExtractor for VisionClient {
    fn name(&self) -> &'static str {
        "L4"
    }

    fn provenance(&self) -> Provenance {
        Provenance::VideoVision
    }

    async fn extract(&self, ctx: &EvidenceContext) -> Result<TierOutcome, ExtractError> {
        if self.config.endpoint.is_empty() {
            return Err(ExtractError::NotAvailable(
                "Vision endpoint not configured".to_string(),
            ));
        }
        if !ctx.is_video {
            return Err(ExtractError::NotAvailable(
                "Vision extraction requires a video source".to_string(),
            ));
        }

        // Minute estimate from the duration hint; the gate reserved this
        let estimated_minutes = ctx
            .video_duration_seconds
            .map(|s| (s / 60.0).ceil().max(1.0));

        let url = ctx.url.clone();
        let response = with_retries(&self.retry, "vision_extract", || self.analyze(&url)).await?;

        let ingredients = response
            .ingredients
            .into_ingredients(Provenance::VideoVision, BASE_CONFIDENCE);
        let cost_units = response.usage.cost_units();

        debug!(
            candidates = ingredients.len(),
            video_minutes = ?response.usage.video_minutes,
            cost_units,
            "Vision extraction complete"
        );

        Ok(TierOutcome {
            metadata: None,
            ingredients,
            confidence: BASE_CONFIDENCE,
            cost_units,
            estimated_cost_units: estimated_minutes,
        })
    }
}

// ============================================================================
// Vision response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(flatten)]
    ingredients: IngredientListPayload,
    #[serde(default)]
    usage: ProviderUsage,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_video_source_not_available() {
        let client = VisionClient::new(
            &LlmProviderConfig {
                endpoint: "https://vision.example.com/v1/analyze".to_string(),
                ..Default::default()
            },
            RetryConfig::default(),
        );
        let ctx = EvidenceContext {
            url: "https://example.com/recipe".to_string(),
            user_id: "u".to_string(),
            title: None,
            description: None,
            source_text: String::new(),
            is_video: false,
            video_duration_seconds: None,
        };
        let result = client.extract(&ctx).await;
        assert!(matches!(result, Err(ExtractError::NotAvailable(_))));
    }

    #[test]
    fn test_vision_response_parsing() {
        let json = r#"{
            "ingredients": [
                {"name": "butter"},
                {"name": "garlic"}
            ],
            "usage": {"video_minutes": 1.6}
        }"#;
        let parsed: VisionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.ingredients.ingredients.len(), 2);
        assert_eq!(parsed.usage.video_minutes, Some(1.6));
        assert!((parsed.usage.cost_units() - 1.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_vision_ingredients_get_video_vision_provenance() {
        let payload: IngredientListPayload =
            serde_json::from_str(r#"{"ingredients": [{"name": "butter"}, {"name": "garlic"}]}"#)
                .unwrap();
        let ingredients = payload.into_ingredients(Provenance::VideoVision, BASE_CONFIDENCE);
        assert!(ingredients
            .iter()
            .all(|i| i.provenance == Provenance::VideoVision));
        let positions: Vec<usize> = ingredients.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }
}
