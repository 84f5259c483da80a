//! Retry with exponential backoff for model calls.
//!
//! Transient failures (429, 5xx, dropped connections, timeouts) are retried
//! with a capped, jittered backoff. Client errors (400, 401, 403, 404, 422)
//! are returned immediately.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = fail on the first error).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Scale delays down by a per-attempt factor.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff with the given number of retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// A config that never retries.
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter; not worth a rand dependency.
            let factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Whether an error string indicates a transient (retryable) failure.
pub fn is_transient_error(error: &str) -> bool {
    if ["429", "500", "502", "503", "504"]
        .iter()
        .any(|s| error.contains(&format!("HTTP {s}")))
    {
        return true;
    }

    let lower = error.to_lowercase();
    [
        "request failed:",
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "broken pipe",
        "network",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Whether an error is a permanent (non-retryable) failure.
pub fn is_permanent_error(error: &str) -> bool {
    [
        "HTTP 400",
        "HTTP 401",
        "HTTP 403",
        "HTTP 404",
        "HTTP 422",
        "bad request",
        "unauthorized",
    ]
    .iter()
    .any(|p| error.contains(p))
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
pub async fn retry_api_call<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e)
                if attempt < config.max_retries
                    && is_transient_error(&e)
                    && !is_permanent_error(&e) =>
            {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient API error (attempt {}/{}): {e}. Retrying in {delay:?}...",
                    attempt + 1,
                    config.max_retries,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(retries: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryConfig::with_retries(retries)
        }
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);
        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn transient_and_permanent_errors() {
        assert!(is_transient_error("chat API HTTP 429: rate limited"));
        assert!(is_transient_error("request failed: connection reset"));
        assert!(!is_transient_error("chat API HTTP 400: bad request"));
        assert!(is_permanent_error("chat API HTTP 401: unauthorized"));
        assert!(!is_transient_error("some random error"));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_api_call(&fast(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("chat API HTTP 503: overloaded".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_api_call(&fast(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("chat API HTTP 401: unauthorized".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
