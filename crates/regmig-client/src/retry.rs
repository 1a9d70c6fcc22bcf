//! Transport retry policy for registry HTTP calls.
//!
//! Only transport failures (connection refused, reset, timeout) are retried.
//! A response with any status is final: a device that the registry rejected
//! is recorded by the engine and picked up again by the next resumed run,
//! so retrying it here would only duplicate that bookkeeping.

use std::time::Duration;

/// Retries after the initial request unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First backoff delay unless configured otherwise.
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;

/// Upper bound on a single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// How a registry client retries transport failures.
///
/// The delay before retry `n` (zero-based) is `base_delay * 2^n`, capped at
/// 30 seconds. `max_retries = 0` sends every request exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Backoff before retry `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(MAX_DELAY, |d| d.min(MAX_DELAY))
    }

    /// Send a request, retrying transport errors per this policy.
    ///
    /// `f` builds and sends a fresh request on every call; it is called at
    /// most `max_retries + 1` times.
    pub(crate) async fn send<F, Fut>(
        &self,
        endpoint: &str,
        f: F,
    ) -> Result<reqwest::Response, reqwest::Error>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        for attempt in 0..self.max_retries {
            match f().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        endpoint,
                        "registry unreachable, retrying in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        f().await
    }
}
