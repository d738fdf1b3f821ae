//! Retry with capped exponential backoff
//!
//! Retries only transient failures (network, timeout, rate limit, 5xx) and
//! honors a server-supplied Retry-After delay when one was given. Client
//! and validation errors fail immediately.

use crate::types::ExtractError;
use cookcard_common::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `f` with the configured retry policy
///
/// `max_attempts` counts the initial attempt; backoff doubles per retry and
/// is capped at `max_delay_ms`. A server `Retry-After` overrides the
/// computed backoff (still capped).
pub async fn with_retries<T, F, Fut>(
    policy: &RetryConfig,
    op: &'static str,
    mut f: F,
) -> Result<T, ExtractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let cap = Duration::from_millis(policy.max_delay_ms);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let backoff = Duration::from_millis(
                    policy
                        .base_delay_ms
                        .saturating_mul(1u64 << (attempt - 1).min(16)),
                );
                let delay = e.retry_after().unwrap_or(backoff).min(cap);
                warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, ExtractError> = with_retries(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_error_never_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, ExtractError> = with_retries(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ExtractError::Api {
                    status: 400,
                    message: "invalid schema".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "client errors must not retry");
    }

    #[tokio::test]
    async fn test_transient_error_retried_up_to_max() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, ExtractError> = with_retries(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ExtractError::Network("connection reset".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<&str, ExtractError> = with_retries(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ExtractError::Timeout("slow".into()))
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_after_is_honored_but_capped() {
        // Retry-After of 10s against a 5ms cap: the test completing quickly
        // proves the cap applies.
        let start = std::time::Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let _: Result<u32, ExtractError> = with_retries(&fast_policy(), "op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ExtractError::RateLimited {
                    retry_after: Some(Duration::from_secs(10)),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
