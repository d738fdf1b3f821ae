//! Text-LLM extraction client (L3)
//!
//! Sends harvested source text to a hosted text-completion model with a
//! strict JSON ingredient schema. Candidates come back with the evidence
//! phrase that justified them; the orchestrator validates those phrases
//! against the source text before anything reaches the client.
//!
//! Cost is reported from the provider's actual token usage. A local
//! character-count estimate rides alongside purely as a discrepancy signal.

use crate::extractors::{error_for_status, retry::with_retries};
use crate::models::{Ingredient, ProviderUsage, Provenance};
use crate::types::{EvidenceContext, ExtractError, TierExtractor, TierOutcome};
use async_trait::async_trait;
use cookcard_common::config::{LlmProviderConfig, RetryConfig};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Base confidence for text-LLM candidates (pre-validation)
const BASE_CONFIDENCE: f32 = 0.8;

/// Extraction prompt requesting the strict ingredient schema
const EXTRACTION_PROMPT: &str = "You extract recipe ingredients from social media text. \
Respond with JSON only: {\"ingredients\": [{\"name\": string, \"amount\": number|null, \
\"unit\": string|null, \"preparation\": string|null, \"section\": string|null, \
\"evidence\": string}]}. The \"evidence\" field must be a verbatim substring of the \
input text that mentions the ingredient. List every ingredient exactly once, in the \
order it appears. Do not invent ingredients that are not in the text.";

/// Hosted text-completion extraction client
pub struct LlmClient {
    http_client: Client,
    config: LlmProviderConfig,
    retry: RetryConfig,
}

impl LlmClient {
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

    async fn complete(&self, source_text: &str) -> Result<CompletionResponse, ExtractError> {
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": EXTRACTION_PROMPT },
                { "role": "user", "content": source_text },
            ],
        });

        let mut request = self.http_client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(ExtractError::from_reqwest)?;
        let response = error_for_status(response).await?;
        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| ExtractError::Parse(format!("Completion response: {}", e)))
    }
}

#[async_trait]
impl TierExtractor for LlmClient {
    fn name(&self) -> &'static str {
        "L3"
    }

    fn provenance(&self) -> Provenance {
        Provenance::LlmText
    }

    async fn extract(&self, ctx: &EvidenceContext) -> Result<TierOutcome, ExtractError> {
        if self.config.endpoint.is_empty() {
            return Err(ExtractError::NotAvailable(
                "LLM endpoint not configured".to_string(),
            ));
        }
        if ctx.source_text.trim().is_empty() {
            return Err(ExtractError::NotAvailable(
                "No source text to extract from".to_string(),
            ));
        }

        // Rough token estimate: ~4 chars per token, fixed completion allowance
        let estimated_tokens = ctx.source_text.len() as f64 / 4.0 + 300.0;
        let estimated_cost_units = estimated_tokens / 1000.0;

        let source_text = ctx.source_text.clone();
        let response =
            with_retries(&self.retry, "llm_extract", || self.complete(&source_text)).await?;

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ExtractError::Parse("Completion had no choices".to_string()))?;

        let payload: IngredientListPayload = serde_json::from_str(content)
            .map_err(|e| ExtractError::Parse(format!("Ingredient schema: {}", e)))?;

        let ingredients = payload.into_ingredients(Provenance::LlmText, BASE_CONFIDENCE);
        let cost_units = response.usage.cost_units();

        debug!(
            candidates = ingredients.len(),
            total_tokens = response.usage.total_tokens,
            cost_units,
            "LLM extraction complete"
        );

        Ok(TierOutcome {
            metadata: None,
            ingredients,
            confidence: BASE_CONFIDENCE,
            cost_units,
            estimated_cost_units: Some(estimated_cost_units),
        })
    }
}

// ============================================================================
// Wire types (shared with the vision client)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: ProviderUsage,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Strict ingredient schema returned by both hosted models
#[derive(Debug, Deserialize)]
pub(crate) struct IngredientListPayload {
    #[serde(default)]
    pub ingredients: Vec<IngredientPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IngredientPayload {
    pub name: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub preparation: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
}

impl IngredientListPayload {
    /// Convert wire candidates into domain ingredients
    ///
    /// Positions assigned here are provisional; the normalizer re-indexes
    /// densely after validation drops.
    pub(crate) fn into_ingredients(
        self,
        provenance: Provenance,
        confidence: f32,
    ) -> Vec<Ingredient> {
        self.ingredients
            .into_iter()
            .enumerate()
            .map(|(position, p)| Ingredient {
                name: p.name,
                normalized_name: String::new(),
                canonical_id: None,
                amount: p.amount,
                unit: p.unit,
                preparation: p.preparation,
                confidence,
                provenance,
                position,
                section: p.section,
                evidence_phrase: p.evidence,
                comment_score: None,
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
