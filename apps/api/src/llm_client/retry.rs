//! Retry engine for outbound completion requests.
//!
//! Only connectivity failures are retried. A response that arrived with an
//! error status is terminal: rate limits and auth failures do not clear up on
//! an immediate retry, so callers get them right away.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::llm_client::error::LlmError;

/// Outcome of a single failed attempt, as seen by the retry loop.
#[derive(Debug)]
pub enum AttemptError {
    /// No response was received. Safe to try again.
    Transport(reqwest::Error),
    /// Anything else. Returned to the caller as-is.
    Terminal(LlmError),
}

impl From<LlmError> for AttemptError {
    fn from(err: LlmError) -> Self {
        AttemptError::Terminal(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Policy for a client configured with `max_retries` retries after the first try.
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`: grows linearly, plus random jitter
    /// so that clients sharing a rate limit don't retry in lockstep.
    fn delay_after(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.base_delay * attempt + Duration::from_millis(jitter)
    }
}

/// Runs `op` until it succeeds, fails terminally, or runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Terminal(err)) => return Err(err),
            Err(AttemptError::Transport(err)) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    "Request failed before a response ({err}), retrying after {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(AttemptError::Transport(err)) => return Err(LlmError::Transport(err)),
        }
    }
}
