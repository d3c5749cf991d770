//! Bounded exponential backoff with jitter for transient dependency errors.
//!
//! Adapted from the teacher's retry policy: a small, explicit config object
//! plus a policy that wraps a fallible async closure, counting attempts
//! against a budget rather than looping unconditionally.

use std::time::Duration;

use rand::RngExt;
use tracing::warn;

use crate::error::{Error, Result};

/// Configuration for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Fraction of the computed delay randomized away (0.0..=1.0).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter_factor: 0.25,
        }
    }
}

/// Runs `op` with exponential backoff, retrying only on recoverable errors.
///
/// # Errors
///
/// Returns the last error once `config.max_attempts` is exhausted, or
/// immediately for a non-recoverable error without retrying.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                let delay = backoff_delay(config, attempt);
                warn!(attempt, ?delay, error = %e, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_recoverable() => {
                return Err(Error::StoreUnavailable(e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.base_delay.as_millis() as f64 * 2f64.powi(attempt as i32 - 1);
    let capped = exp.min(config.max_delay.as_millis() as f64);
    let jitter = rand::rng().random_range(0.0..=config.jitter_factor);
    let jittered = capped * (1.0 - jitter);
    Duration::from_millis(jittered.max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_recoverable_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        };
        let result = with_retry(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::StoreUnavailable("transient".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_validation_errors() {
        let config = RetryConfig::default();
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Validation("bad input".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_budget_and_surfaces_store_unavailable() {
        let config = RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter_factor: 0.0,
        };
        let result: Result<()> = with_retry(&config, || async {
            Err(Error::StoreUnavailable("down".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }
}
