//! Retry loop with per-attempt and total time budgets.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::{
    error::{FetchError, ProxyError},
    origin::{Origin, OriginResponse},
    stats::ProxyStats,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub request_timeout: Duration,
    /// Budget measured from the first attempt, checked before each attempt.
    pub total_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform random term added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_timeout: Duration::from_secs(10),
            total_timeout: Duration::from_secs(30),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^attempt + rand[0, jitter), max_delay)`
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            self.jitter.mul_f64(rand::rng().random::<f64>())
        };
        backoff.saturating_add(jitter).min(self.max_delay)
    }
}

/// Fetch `url` from `origin`, retrying retryable failures under `policy`.
///
/// Any HTTP status counts as a completed attempt; only transport-level
/// failures are retried.
pub async fn fetch_with_retry<O: Origin>(
    origin: &O,
    url: &str,
    policy: &RetryPolicy,
    stats: &ProxyStats,
) -> Result<OriginResponse, ProxyError> {
    let start = Instant::now();
    let mut last = None;
    let mut attempts = 0;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay(attempt - 1);
            if start.elapsed() + delay > policy.total_timeout {
                return Err(ProxyError::TotalTimeout {
                    url: url.to_string(),
                    budget: policy.total_timeout,
                    attempts,
                });
            }
            warn!(url, attempt, max_retries = policy.max_retries, ?delay, "Retrying origin fetch");
            tokio::time::sleep(delay).await;
        }

        attempts += 1;
        stats.record_attempt();
        let result = match tokio::time::timeout(policy.request_timeout, origin.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: policy.request_timeout,
            }),
        };

        match result {
            Ok(response) => return Ok(response),
            Err(e) if e.is_fatal() => {
                error!(url, attempt = attempts, error = %e, "Origin fetch failed fatally");
                return Err(ProxyError::Fatal {
                    url: url.to_string(),
                    source: e,
                });
            }
            Err(e) => {
                error!(url, attempt = attempts, error = %e, "Origin fetch attempt failed");
                last = Some(e);
            }
        }
    }

    Err(ProxyError::RetriesExhausted {
        url: url.to_string(),
        attempts,
        last: last.unwrap_or_else(|| FetchError::Transport {
            url: url.to_string(),
            reason: "no attempt was made".to_string(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_without_jitter() {
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(4), Duration::from_secs(10));
        assert_eq!(policy.delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_jitter_range() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let d = policy.delay(1);
            assert!(d >= Duration::from_secs(2) && d < Duration::from_secs(3), "{d:?}");
        }
    }
}
