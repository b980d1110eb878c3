use crate::error::JobLogError;
use state::StateError;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::time::Duration;

/// Exponential backoff applied to every store call.
///
/// The delay before retry `n` is `initial_delay * 2^(n - 1)`, capped at `max_delay`.
/// Errors rejected by `retryable` are surfaced straight away.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub retryable: fn(&StateError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            retryable: StateError::is_transient,
        }
    }
}

impl Debug for RetryPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Call once, never retrying.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait before the given retry, counting from 1.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor: u32 = 2u32.saturating_pow(retry.saturating_sub(1));

        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub(crate) async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, JobLogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StateError>>,
    {
        let max_attempts: u32 = self.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && (self.retryable)(&err) => {
                    let delay: Duration = self.delay(attempt);

                    tracing::warn!(
                        operation = %err.operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after {err}"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(JobLogError::from_state(err, attempt)),
            }
        }
    }
}
