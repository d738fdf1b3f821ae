//! Transcript harvester (L2.5)
//!
//! Fetches the spoken transcript of a video post. Only consulted when the
//! description and comments were too sparse and the source is a video.

use crate::extractors::{error_for_status, retry::with_retries};
use crate::types::{
    EvidenceContext, EvidenceSource, ExtractError, HarvestedText, TextHarvester,
};
use async_trait::async_trait;
use cookcard_common::config::{ProviderConfig, RetryConfig};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Platform transcript client
pub struct TranscriptClient {
    http_client: Client,
    endpoint: String,
    retry: RetryConfig,
}

impl TranscriptClient {
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

    async fn fetch(&self, url: &str) -> Result<TranscriptResponse, ExtractError> {
        let response = self
            .http_client
            .get(format!("{}/transcript", self.endpoint))
            .query(&[("url", url)])
            .send()
            .await
            .map_err(ExtractError::from_reqwest)?;

        let response = error_for_status(response).await?;
        response
            .json::<TranscriptResponse>()
            .await
            .map_err(|e| ExtractError::Parse(format!("Transcript response: {}", e)))
    }
}

#[async_trait]
impl TextHarvester for TranscriptClient {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::Transcript
    }

    async fn harvest(&self, ctx: &EvidenceContext) -> Result<HarvestedText, ExtractError> {
        if !ctx.is_video {
            return Err(ExtractError::NotAvailable(
                "Transcript harvest requires a video source".to_string(),
            ));
        }
        if self.endpoint.is_empty() {
            return Err(ExtractError::NotAvailable(
                "Transcript endpoint not configured".to_string(),
            ));
        }

        let url = ctx.url.clone();
        let response = with_retries(&self.retry, "transcript", || self.fetch(&url)).await?;

        let text = response
            .segments
            .into_iter()
            .map(|s| s.text)
            .collect::<Vec<_>>()
            .join(" ");

        debug!(url = %ctx.url, chars = text.len(), "Transcript harvested");
        Ok(HarvestedText {
            source: EvidenceSource::Transcript,
            text,
            top_comment_score: None,
        })
    }
}

// ============================================================================
// Transcript response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Deserialize)]
struct TranscriptSegment {
    text: String,
}

// ============================================================================
// Tests
// ============================================================================
