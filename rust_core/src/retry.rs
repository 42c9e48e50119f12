//! Bounded retry with exponential backoff
//!
//! Wraps registry rebuilds during start and resynchronization. A failed
//! rebuild only degrades instrument naming, so attempts are capped instead
//! of retrying forever.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff settings for a retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 5)
    pub max_attempts: u32,
    /// Delay before the second attempt (default: 500ms)
    pub base_delay_ms: u64,
    /// Cap on any single delay (default: 10000ms)
    pub max_delay_ms: u64,
    /// Jitter fraction applied to each delay (default: 0.1 = ±10%)
    pub jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter_pct: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay_ms as f64;
        let exponential_ms = base_ms * 2f64.powi(attempt.saturating_sub(1).min(30) as i32);
        let capped_ms = exponential_ms.min(self.max_delay_ms as f64);

        let jitter_range = capped_ms * self.jitter_pct;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_ms = (capped_ms + jitter).max(0.0);

        Duration::from_millis(final_ms as u64)
    }
}

/// Run `f` until it succeeds or `config.max_attempts` is exhausted.
///
/// The last error is returned unchanged.
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts => {
                let delay = config.calculate_delay(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {:#}. Retrying in {:?}",
                    operation, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_pct: 0.0,
        }
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_pct: 0.0,
        };

        assert_eq!(config.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(4), Duration::from_millis(800));
        assert_eq!(config.calculate_delay(5), Duration::from_millis(1000));
        assert_eq!(config.calculate_delay(60), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_within_range() {
        let config = RetryConfig {
            jitter_pct: 0.1,
            base_delay_ms: 1000,
            ..RetryConfig::default()
        };

        for _ in 0..50 {
            let delay = config.calculate_delay(1).as_millis();
            assert!((900..=1100).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = retry_with_backoff(&fast(), "rebuild", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                    Err(anyhow::anyhow!("lister unavailable"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = retry_with_backoff(&fast(), "rebuild", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("lister unavailable"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "lister unavailable");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
