use std::{future::Future, time::Duration};

use tokio_retry::{strategy::jitter, RetryIf};

use tracing::warn;

use crate::error::AppError;

/// Awaits one outbound call, failing with [`AppError::Timeout`] once `limit` has passed.
pub async fn with_timeout<T, Fut>(limit: Duration, operation: &str, call: Fut) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, AppError>>,
{
    if let Ok(result) = tokio::time::timeout(limit, call).await {
        result
    } else {
        warn!(operation, timeout_ms = limit.as_millis(), "Outbound call timed out");
        Err(AppError::Timeout(format!(
            "{operation} did not finish within {}ms",
            limit.as_millis()
        )))
    }
}

/// Backoff policy wrapped around provider calls.
///
/// `max_attempts` counts the first try, so a policy with three attempts sleeps at most twice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sleep durations between attempts.
    pub fn delays(&self) -> Vec<Duration> {
        let retries = self.max_attempts.saturating_sub(1);
        (0..retries)
            .map(|attempt| {
                let factor = self.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
                let delay = self.base_delay.mul_f64(factor.max(0.0)).min(self.max_delay);
                if self.jitter {
                    jitter(delay)
                } else {
                    delay
                }
            })
            .collect()
    }

    /// Runs `operation` until it succeeds, the attempts run out, or `retryable` rejects the error.
    pub async fn run<T, F, Fut, C>(&self, operation: F, retryable: C) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
        C: FnMut(&AppError) -> bool,
    {
        RetryIf::spawn(self.delays(), operation, retryable).await
    }

    /// Same as [`RetryPolicy::run`] using [`AppError::is_transient`] as the condition.
    pub async fn run_transient<T, F, Fut>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.run(operation, AppError::is_transient).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[test]
    fn delays_grow_by_multiplier_and_respect_cap() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(300),
            jitter: false,
        };
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300)
            ]
        );
        assert!(RetryPolicy::none().delays().is_empty());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = fast_policy()
            .run_transient(|| {
                let counter = Arc::clone(&counter);
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(AppError::Provider("503 from upstream".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.expect("eventually succeeds"), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), AppError> = fast_policy()
            .run_transient(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::LLMParsing("not json".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::LLMParsing(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_calls_time_out() {
        let result: Result<(), AppError> = with_timeout(
            Duration::from_millis(20),
            "vector search",
            std::future::pending(),
        )
        .await;

        match result {
            Err(AppError::Timeout(message)) => assert!(message.starts_with("vector search")),
            other => panic!("expected a timeout, got {other:?}"),
        }

        let quick = with_timeout(Duration::from_secs(1), "embedding", async { Ok(7) }).await;
        assert_eq!(quick.expect("finished in time"), 7);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), AppError> = fast_policy()
            .run_transient(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::Timeout("embedding".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
