//! Retry with exponential backoff for provider calls.
//!
//! Transient failures (see [`ProviderError::is_retryable`]) are retried up to
//! `max_attempts` times in total, waiting `base_delay × 2^attempt` between
//! attempts. Permanent failures propagate immediately. When every attempt
//! fails, the caller gets [`ProviderError::Unavailable`].

use std::future::Future;
use std::time::Duration;
use threadwise_config::OrchestratorConfig;
use threadwise_core::error::ProviderError;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> std::result::Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(label, attempt = attempt + 1, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt + 1 >= self.max_attempts => {
                    warn!(label, attempts = self.max_attempts, error = %e, "Retries exhausted");
                    return Err(ProviderError::Unavailable(format!(
                        "{label} failed after {} attempts: {e}",
                        self.max_attempts
                    )));
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted sequence of outcomes; records how many times it was polled.
    struct Script {
        outcomes: Mutex<Vec<std::result::Result<u32, ProviderError>>>,
        calls: Mutex<usize>,
    }

    impl Script {
        fn new(mut outcomes: Vec<std::result::Result<u32, ProviderError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            }
        }

        async fn next(&self) -> std::result::Result<u32, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(ProviderError::Network("script exhausted".into())))
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    fn overloaded() -> ProviderError {
        ProviderError::ApiError {
            status_code: 529,
            message: "overloaded".into(),
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let script = Script::new(vec![Err(overloaded()), Err(overloaded()), Ok(7)]);
        let policy = RetryPolicy::default();

        let started = tokio::time::Instant::now();
        let value = policy.run("test", || script.next()).await.unwrap();

        assert_eq!(value, 7);
        assert_eq!(script.calls(), 3);
        // 1s + 2s of backoff under the paused clock
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_propagates_immediately() {
        let script = Script::new(vec![Err(ProviderError::AuthenticationFailed("bad key".into()))]);
        let err = RetryPolicy::default().run("test", || script.next()).await.unwrap_err();

        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_become_unavailable() {
        let script = Script::new(vec![
            Err(ProviderError::Network("reset".into())),
            Err(ProviderError::Network("reset".into())),
            Err(ProviderError::Network("reset".into())),
            Ok(1),
        ]);
        let err = RetryPolicy::default().run("generate", || script.next()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(script.calls(), 3);
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
    }
}
