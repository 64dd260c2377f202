//! Bounded retry with multiplicative backoff.
//!
//! The sleep side effect is injected so tests can run the loop without
//! waiting. Callers get back either the first success or the final error —
//! degrading an exhausted retry into a placeholder record is the caller's
//! decision, not this module's.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

/// Injected sleep abstraction.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2,
        }
    }
}

/// Runs `op` up to `policy.max_attempts` times, sleeping between attempts
/// with the delay multiplied by `backoff_factor` each round. The closure
/// receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.base_delay;
    let mut attempt = 1u32;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                warn!(label, attempt, %err, "retries exhausted");
                return Err(err);
            }
            Err(err) => {
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %err,
                    "attempt failed, backing off"
                );
                sleeper.sleep(delay).await;
                delay *= policy.backoff_factor;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requested delays instead of sleeping.
    pub struct RecordingSleeper {
        pub delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn new() -> Self {
            RecordingSleeper {
                delays: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    #[tokio::test]
    async fn test_succeeds_without_sleeping() {
        let sleeper = RecordingSleeper::new();
        let result: Result<u32, &str> =
            retry_with_backoff(&RetryPolicy::default(), &sleeper, "op", |_| async {
                Ok(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backoff_multiplies_between_attempts() {
        let sleeper = RecordingSleeper::new();
        let attempts = Mutex::new(0u32);
        let result: Result<u32, &str> =
            retry_with_backoff(&RetryPolicy::default(), &sleeper, "op", |attempt| {
                *attempts.lock().unwrap() = attempt;
                async move {
                    if attempt < 3 {
                        Err("transient")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let sleeper = RecordingSleeper::new();
        let seen = Mutex::new(Vec::new());
        let result: Result<u32, String> =
            retry_with_backoff(&RetryPolicy::default(), &sleeper, "op", |attempt| {
                seen.lock().unwrap().push(attempt);
                async move { Err(format!("failure {attempt}")) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        // Only two sleeps for three attempts.
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_clamped_to_one() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        let result: Result<u32, &str> =
            retry_with_backoff(&policy, &sleeper, "op", |_| async { Err("nope") }).await;
        assert!(result.is_err());
    }
}
