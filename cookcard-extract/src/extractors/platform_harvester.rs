//! Platform text harvester (L2)
//!
//! Recovers source text from the platform content endpoints. Two modes
//! behind one client: the description harvester (which short-circuits to
//! client-supplied text when present) and the comment harvester, which
//! keeps only the highest-scored comments.

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

/// Highest-scored comments kept per harvest
const MAX_COMMENTS: usize = 10;

/// Which platform endpoint this instance reads
#[derive(Debug, Clone, Copy)]
enum Mode {
    Description,
    Comments,
}

/// Platform description/comment harvester
pub struct PlatformHarvester {
    http_client: Client,
    endpoint: String,
    retry: RetryConfig,
    mode: Mode,
}

impl PlatformHarvester {
    /// Harvester for the post description
    pub fn description(config: &ProviderConfig, retry: RetryConfig) -> Self {
        Self::new(config, retry, Mode::Description)
    }

    /// Harvester for top platform comments
    pub fn comments(config: &ProviderConfig, retry: RetryConfig) -> Self {
        Self::new(config, retry, Mode::Comments)
    }

    fn new(config: &ProviderConfig, retry: RetryConfig, mode: Mode) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: config.endpoint.clone(),
            retry,
            mode,
        }
    }

    async fn fetch_description(&self, url: &str) -> Result<ContentResponse, ExtractError> {
        let response = self
            .http_client
            .get(format!("{}/content", self.endpoint))
            .query(&[("url", url)])
            .send()
            .await
            .map_err(ExtractError::from_reqwest)?;

        let response = error_for_status(response).await?;
        response
            .json::<ContentResponse>()
            .await
            .map_err(|e| ExtractError::Parse(format!("Platform content response: {}", e)))
    }

    async fn fetch_comments(&self, url: &str) -> Result<CommentsResponse, ExtractError> {
        let response = self
            .http_client
            .get(format!("{}/comments", self.endpoint))
            .query(&[("url", url)])
            .send()
            .await
            .map_err(ExtractError::from_reqwest)?;

        let response = error_for_status(response).await?;
        response
            .json::<CommentsResponse>()
            .await
            .map_err(|e| ExtractError::Parse(format!("Platform comments response: {}", e)))
    }
}

#[async_trait]
impl TextHarvester for PlatformHarvester {
    fn source(&self) -> EvidenceSource {
        match self.mode {
            Mode::Description => EvidenceSource::Description,
            Mode::Comments => EvidenceSource::Comments,
        }
    }

    async fn harvest(&self, ctx: &EvidenceContext) -> Result<HarvestedText, ExtractError> {
        match self.mode {
            Mode::Description => {
                // A client-supplied description is authoritative; no call needed
                if let Some(description) = ctx.description.as_deref() {
                    if !description.trim().is_empty() {
                        return Ok(HarvestedText {
                            source: EvidenceSource::Description,
                            text: description.to_string(),
                            top_comment_score: None,
                        });
                    }
                }

                if self.endpoint.is_empty() {
                    return Err(ExtractError::NotAvailable(
                        "Platform endpoint not configured".to_string(),
                    ));
                }

                let url = ctx.url.clone();
                let response =
                    with_retries(&self.retry, "platform_content", || self.fetch_description(&url))
                        .await?;
                debug!(url = %ctx.url, chars = response.description.len(), "Description harvested");
                Ok(HarvestedText {
                    source: EvidenceSource::Description,
                    text: response.description,
                    top_comment_score: None,
                })
            }
            Mode::Comments => {
                if self.endpoint.is_empty() {
                    return Err(ExtractError::NotAvailable(
                        "Platform endpoint not configured".to_string(),
                    ));
                }

                let url = ctx.url.clone();
                let response =
                    with_retries(&self.retry, "platform_comments", || self.fetch_comments(&url))
                        .await?;

                let mut comments = response.comments;
                comments.sort_by(|a, b| b.score.cmp(&a.score));
                comments.truncate(MAX_COMMENTS);

                let top_comment_score = comments.first().map(|c| c.score);
                let text = comments
                    .into_iter()
                    .map(|c| c.text)
                    .collect::<Vec<_>>()
                    .join("\n");

                debug!(url = %ctx.url, chars = text.len(), "Comments harvested");
                Ok(HarvestedText {
                    source: EvidenceSource::Comments,
                    text,
                    top_comment_score,
                })
            }
        }
    }
}

// ============================================================================
// Platform response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct CommentsResponse {
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct Comment {
    text: String,
    #[serde(default)]
    score: i64,
}

// ============================================================================
// Tests
// ============================================================================
