//! Extraction endpoint
//!
//! `POST /extract` runs one URL through the ladder. The response is always
//! renderable: a full Cook Card on success, or a gated envelope carrying a
//! lite card (`fallback: "cook_card_lite"`) when a rate, quota, or budget
//! limit stopped the extraction.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::ladder::{LadderOutcome, LadderRequest};
use crate::AppState;

/// POST /extract request body
#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    /// Shared recipe URL
    pub url: String,
    /// Post title, when the client already has it
    #[serde(default)]
    pub title: Option<String>,
    /// Post description/caption, when the client already has it
    #[serde(default)]
    pub description: Option<String>,
    /// Requesting user
    pub user_id: String,
    /// Household the card will be saved into
    #[serde(default)]
    pub household_id: Option<String>,
}

/// POST /extract
pub async fn extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<Response> {
    if request.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url must not be empty".to_string()));
    }
    if request.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }

    let ladder_request = LadderRequest {
        url: request.url,
        title: request.title,
        description: request.description,
        user_id: request.user_id,
        household_id: request.household_id,
    };

    match state.orchestrator.run(ladder_request).await {
        Ok(LadderOutcome::Complete { cook_card, .. }) => {
            Ok((StatusCode::OK, Json(cook_card)).into_response())
        }
        Ok(LadderOutcome::Gated {
            kind,
            message,
            cook_card,
        }) => {
            let body = json!({
                "error": {
                    "kind": kind.as_str(),
                    "message": message,
                },
                "fallback": "cook_card_lite",
                "cook_card": cook_card,
            });
            Ok((StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response())
        }
        Err(e) => {
            error!(error = %e, "Extraction failed");
            *state.last_error.write().await = Some(e.to_string());
            Err(ApiError::Common(e))
        }
    }
}

/// Build extraction routes
pub fn extract_routes() -> Router<AppState> {
    Router::new().route("/extract", post(extract))
}

// ============================================================================
// Tests
// ============================================================================
