use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::ratings::{RatingsError, UpstreamError};

/// Bounded retry with linearly increasing backoff: the n-th failed attempt waits
/// `n * base_delay` before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

#[derive(Debug)]
pub(crate) enum RetryDecision {
    Backoff(Duration),
    GiveUp(UpstreamError),
}

/// Attempt bookkeeping, kept apart from the async driver so transitions can be checked
/// without timers.
#[derive(Debug)]
pub(crate) struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub(crate) fn record_failure(&self, error: UpstreamError) -> RetryDecision {
        if self.attempt >= self.policy.max_attempts {
            return RetryDecision::GiveUp(UpstreamError::RetriesExhausted {
                attempts: self.attempt,
                last: Box::new(error),
            });
        }
        RetryDecision::Backoff(self.policy.delay_after(self.attempt))
    }
}

/// Drives `operation` under `policy`, aborting with `Cancelled` as soon as `cancel` fires,
/// whether an attempt is in flight or the loop is sleeping between attempts.
pub(crate) async fn run_with_retries<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RatingsError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut state = RetryState::new(policy);

    loop {
        if cancel.is_cancelled() {
            return Err(RatingsError::Cancelled);
        }

        let attempt = state.begin_attempt();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RatingsError::Cancelled),
            outcome = operation(attempt) => outcome,
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match state.record_failure(error) {
            RetryDecision::GiveUp(error) => return Err(error.into()),
            RetryDecision::Backoff(delay) => {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "upstream attempt failed, backing off"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RatingsError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
