//! oEmbed client (L1)
//!
//! Queries the public link-metadata endpoint for title, creator, thumbnail
//! and (for video links) a duration hint. Always runs, costs nothing, and
//! its failure is non-fatal: the card simply continues without metadata.

use crate::extractors::{error_for_status, retry::with_retries};
use crate::models::Provenance;
use crate::types::{EvidenceContext, ExtractError, SourceMetadata, TierExtractor, TierOutcome};
use async_trait::async_trait;
use cookcard_common::config::{ProviderConfig, RetryConfig};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// oEmbed metadata client
pub struct OembedClient {
    http_client: Client,
    endpoint: String,
    retry: RetryConfig,
}

impl OembedClient {
    pub fn new(config: &ProviderConfig, retry: RetryConfig) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: config.endpoint.clone(),
            retry,
        }
    }

    async fn fetch(&self, url: &str) -> Result<OembedResponse, ExtractError> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[("url", url), ("format", "json")])
            .send()
            .await
            .map_err(ExtractError::from_reqwest)?;

        let response = error_for_status(response).await?;
        response
            .json::<OembedResponse>()
            .await
            .map_err(|e| ExtractError::Parse(format!("oEmbed response: {}", e)))
    }
}

#[async_trait]
impl TierExtractor for OembedClient {
    fn name(&self) -> &'static str {
        "L1"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Oembed
    }

    async fn extract(&self, ctx: &EvidenceContext) -> Result<TierOutcome, ExtractError> {
        if self.endpoint.is_empty() {
            return Err(ExtractError::NotAvailable(
                "oEmbed endpoint not configured".to_string(),
            ));
        }

        let url = ctx.url.clone();
        let response = with_retries(&self.retry, "oembed", || self.fetch(&url)).await?;

        debug!(
            url = %ctx.url,
            title = ?response.title,
            kind = ?response.kind,
            "oEmbed metadata fetched"
        );

        Ok(TierOutcome {
            metadata: Some(SourceMetadata {
                title: response.title,
                creator: response.author_name,
                image_url: response.thumbnail_url,
                duration_seconds: response.duration,
                is_video: response.kind.as_deref().map(|k| k == "video"),
            }),
            ingredients: Vec::new(),
            confidence: 0.95,
            cost_units: 0.0,
            estimated_cost_units: None,
        })
    }
}

// ============================================================================
// oEmbed response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OembedResponse {
    title: Option<String>,
    author_name: Option<String>,
    thumbnail_url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    /// Non-standard but commonly present for video links
    duration: Option<f64>,
}

// ============================================================================
// Tests
// ============================================================================
