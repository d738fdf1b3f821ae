//! Tier extractor adapters
//!
//! Each ladder tier talks to one external collaborator behind the uniform
//! `TierExtractor`/`TextHarvester` interfaces:
//! - L1 `OembedClient` — public link-metadata endpoint
//! - L2 `PlatformHarvester` — platform description and comment endpoints
//! - L2.5 `TranscriptClient` — platform transcript endpoint
//! - L3 `LlmClient` — hosted text-completion model (strict ingredient schema)
//! - L4 `VisionClient` — hosted multimodal model over the raw video
//!
//! All adapters share a hard per-request timeout and the capped exponential
//! backoff in `retry`, which honors server-supplied retry delays and never
//! retries client/validation errors.

pub mod llm_client;
pub mod oembed_client;
pub mod platform_harvester;
pub mod retry;
pub mod transcript_client;
pub mod vision_client;

pub use llm_client::LlmClient;
pub use oembed_client::OembedClient;
pub use platform_harvester::PlatformHarvester;
pub use transcript_client::TranscriptClient;
pub use vision_client::VisionClient;

use crate::types::ExtractError;
use std::time::Duration;

/// Map a non-success response to an `ExtractError`
///
/// 429 becomes `RateLimited` carrying any server-supplied Retry-After;
/// everything else becomes `Api` with the response body as context.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ExtractError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ExtractError::RateLimited { retry_after });
    }

    let message = response.text().await.unwrap_or_default();
    Err(ExtractError::Api {
        status: status.as_u16(),
        message,
    })
}
