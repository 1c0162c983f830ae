//! Retry policy for the I/O around the projection core.
//!
//! The policy is a plain value; callers that poll or read files decide
//! when to apply it.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Exponential backoff schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after each retry
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound for a single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    4
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), capped at `max_delay_ms`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Every delay the policy allows, in order
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|r| self.delay_for(r)).collect()
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// Returns the last error when every attempt fails.
pub async fn retry_async<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    "Retry {}/{} after {}ms: {}",
                    attempt,
                    max_attempts,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            initial_delay_ms: 1000,
            multiplier: 10.0,
            max_attempts: 6,
            max_delay_ms: 5000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(5000));
    }

    #[test]
    fn test_parse_partial_toml() {
        let policy: RetryPolicy = toml::from_str("max_attempts = 2").unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.initial_delay_ms, 1000);
    }

    #[tokio::test]
    async fn test_retry_async_succeeds_after_retries() {
        let policy = RetryPolicy {
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_attempts: 4,
            max_delay_ms: 10,
        };
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = retry_async(&policy, move || {
            let counter = counter.clone();
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(format!("transient failure #{attempt}"))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_gives_up() {
        let policy = RetryPolicy {
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_attempts: 3,
            max_delay_ms: 10,
        };
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_async(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always fail".to_string()) }
        })
        .await;

        assert_eq!(result, Err("always fail".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
