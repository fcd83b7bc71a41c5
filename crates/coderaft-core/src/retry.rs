//! Retry and backoff utilities
//!
//! Two distinct policies live here: a jittered [`RetryConfig`] for transient
//! engine-call failures (pull, connect), and a deterministic [`Backoff`] for
//! readiness polling, where the testable property requires predictable poll
//! timing rather than randomized delay.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Jitter strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JitterStrategy {
    /// Full jitter: random delay between 0 and calculated delay
    #[default]
    FullJitter,
    /// Equal jitter: half calculated delay plus random half
    EqualJitter,
}

/// Configuration for jittered retry behavior (engine-call retries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (excluding initial attempt)
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Jitter strategy to apply
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay
            .as_millis()
            .saturating_mul(2_u128.pow(attempt));
        let capped_delay = exponential_delay.min(self.max_delay.as_millis());
        let delay_ms = capped_delay as u64;
        self.apply_jitter(Duration::from_millis(delay_ms))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        match self.jitter {
            JitterStrategy::FullJitter => {
                let jitter_ms = fastrand::u64(0..=delay.as_millis() as u64);
                Duration::from_millis(jitter_ms)
            }
            JitterStrategy::EqualJitter => {
                let half_delay = delay.as_millis() as u64 / 2;
                let jitter_ms = half_delay + fastrand::u64(0..=half_delay);
                Duration::from_millis(jitter_ms)
            }
        }
    }
}

/// Error classification result for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation
    Retry,
    /// Do not retry (terminal error)
    Stop,
}

/// Error classifier function type
pub type ErrorClassifier<E> = fn(&E) -> RetryDecision;

/// Default error classifier that retries on all errors
pub fn default_classifier<E>(_error: &E) -> RetryDecision {
    RetryDecision::Retry
}

/// Retry an async operation with exponential backoff and jitter
#[instrument(level = "debug", skip(operation, classify_error))]
pub async fn retry_async<T, E, Fut, Op>(
    config: &RetryConfig,
    operation: Op,
    classify_error: ErrorClassifier<E>,
) -> std::result::Result<T, E>
where
    Op: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut last_error = None;

    for attempt in 0..=config.max_attempts {
        debug!("retry attempt {} of {}", attempt, config.max_attempts);

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                debug!("operation failed on attempt {}: {:?}", attempt, error);
                if classify_error(&error) == RetryDecision::Stop {
                    return Err(error);
                }
                last_error = Some(error);
                if attempt < config.max_attempts {
                    let delay = config.calculate_delay(attempt);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    let final_error = last_error.expect("at least one attempt was made");
    warn!(
        "all {} retry attempts exhausted: {:?}",
        config.max_attempts + 1,
        final_error
    );
    Err(final_error)
}

/// Deterministic, non-jittered exponential backoff used for readiness
/// polling: start at 25ms, double each step, cap at 500ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(25),
            cap: Duration::from_millis(500),
        }
    }
}

impl Backoff {
    /// Delay before the given (0-based) poll attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .initial
            .as_millis()
            .saturating_mul(1u128 << attempt.min(32));
        Duration::from_millis(exp.min(self.cap.as_millis()) as u64)
    }

    /// Sleep for the delay corresponding to `attempt`.
    pub async fn wait(&self, attempt: u32) {
        tokio::time::sleep(self.delay_for(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_retry_async_success_after_retries() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter: JitterStrategy::FullJitter,
        };
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = Arc::clone(&call_count);

        let operation = move || {
            let count = call_count_clone.clone();
            async move {
                let current = count.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    Err("temporary failure")
                } else {
                    Ok(42)
                }
            }
        };

        let result = retry_async(&config, operation, default_classifier).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_stops_on_classify_decision() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter: JitterStrategy::FullJitter,
        };
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = Arc::clone(&call_count);

        let operation = move || {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<i32, i32>(404)
            }
        };
        let classifier = |error: &i32| {
            if *error == 404 {
                RetryDecision::Stop
            } else {
                RetryDecision::Retry
            }
        };

        let result = retry_async(&config, operation, classifier).await;
        assert_eq!(result.unwrap_err(), 404);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let b = Backoff::default();
        assert_eq!(b.delay_for(0), Duration::from_millis(25));
        assert_eq!(b.delay_for(1), Duration::from_millis(50));
        assert_eq!(b.delay_for(2), Duration::from_millis(100));
        assert_eq!(b.delay_for(3), Duration::from_millis(200));
        assert_eq!(b.delay_for(4), Duration::from_millis(400));
        assert_eq!(b.delay_for(5), Duration::from_millis(500));
        assert_eq!(b.delay_for(20), Duration::from_millis(500));
    }
}
