//! Retry with exponential backoff and jitter.
//!
//! Used for oracle rate-limit responses and for transient failures while
//! executing a freshly created card. The caller decides which errors are
//! retryable; everything else is returned after the first attempt.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff policy: how often to try and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total tries, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// No single wait exceeds this.
    pub max_delay: Duration,
    /// Growth of the wait per failed attempt.
    pub backoff_factor: f64,
    /// Randomize each wait within 50%..150% of its nominal value.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy with no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait after failed attempt number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.as_secs_f64();
        let nominal = (self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32)).min(cap);
        if nominal <= 0.0 {
            return Duration::ZERO;
        }

        let secs = if self.jitter {
            (nominal * rand::rng().random_range(0.5..1.5)).min(cap)
        } else {
            nominal
        };
        Duration::from_secs_f64(secs)
    }
}

/// Statistics about a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Run `operation` until it succeeds, hits a non-retryable error, or the
/// attempt budget is spent.
///
/// `label` names the operation in log lines. Returns the final result with
/// the statistics gathered along the way.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;

        let err = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("{} succeeded after {} attempts", label, attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };

        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            debug!("{} failed with non-retryable error: {}", label, err);
            return (Err(err), stats);
        }

        if attempt + 1 >= max_attempts {
            warn!(
                "{}: all {} attempts exhausted, last error: {}",
                label, max_attempts, err
            );
            return (Err(err), stats);
        }

        let delay = config.backoff(attempt);
        stats.total_delay += delay;
        warn!(
            "{}: attempt {}/{} failed: {}. Retrying in {:?}",
            label,
            attempt + 1,
            max_attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_doubles_without_jitter() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_jitter(false);

        assert_eq!(config.backoff(0), Duration::from_secs(2));
        assert_eq!(config.backoff(1), Duration::from_secs(4));
        assert_eq!(config.backoff(2), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter(false);

        assert_eq!(config.backoff(3), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_jitter(true);

        for _ in 0..20 {
            let delay = config.backoff(0);
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_immediate_has_no_delay() {
        let config = RetryConfig::immediate(5);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff(4), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let config = RetryConfig::immediate(3);
        let counter = Arc::new(AtomicU32::new(0));

        let (result, stats) = retry_async(
            &config,
            "flaky",
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("rate limited".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
            |_: &String| true,
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(stats.attempts, 3);
        assert!(stats.success);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let config = RetryConfig::immediate(2);

        let (result, stats) = retry_async(
            &config,
            "always",
            || async { Err::<(), _>("still limited".to_string()) },
            |_: &String| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.last_error.as_deref(), Some("still limited"));
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let config = RetryConfig::immediate(5);

        let (result, stats) = retry_async(
            &config,
            "fatal",
            || async { Err::<(), _>("syntax error".to_string()) },
            |e: &String| e.contains("limited"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 1);
        assert!(!stats.success);
    }
}
