//! Exponential backoff with a per-attempt timeout for speech service calls.

use crate::error::AttemptTimedOut;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempt budget for one logical service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Time limit for each individual attempt.
    pub attempt_timeout: Duration,
    /// Delay after the first failure; doubles after each further failure.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Announcement synthesis: 3 attempts, 60 s each, 1 s then 2 s backoff.
    pub const SYNTHESIS: Self = Self {
        max_attempts: 3,
        attempt_timeout: Duration::from_secs(60),
        initial_backoff: Duration::from_secs(1),
    };

    /// Step-name transcription: 2 attempts, 15 s each, 500 ms backoff.
    pub const TRANSCRIPTION: Self = Self {
        max_attempts: 2,
        attempt_timeout: Duration::from_secs(15),
        initial_backoff: Duration::from_millis(500),
    };

    /// Delay after the given failed attempt (1-indexed).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exp)
    }
}

/// Every attempt failed; `last` is the final attempt's error.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-indexed attempt number. An attempt that exceeds
/// `attempt_timeout` fails with `E::from(AttemptTimedOut)`.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<AttemptTimedOut> + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.attempt_timeout, op(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(E::from(AttemptTimedOut(policy.attempt_timeout))),
        };
        match result {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                warn!(label, attempt, error = %e, "giving up");
                return Err(Exhausted { attempts: attempt, last: e });
            }
            Err(e) => {
                let delay = policy.backoff_after(attempt);
                warn!(label, attempt, ?delay, error = %e, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
