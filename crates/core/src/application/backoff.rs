// Backoff-aware retry around a single external call

use crate::application::constants::{DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_ATTEMPTS};
use crate::application::processor::ProcessError;
use crate::domain::Job;
use crate::port::JobRepository;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay
    Retry(Duration),
    /// Give up; the item fails with the contained message
    GiveUp(String),
}

/// Retry policy for rate-limited external calls
///
/// Delay grows linearly with the attempt number (`base_delay * attempt`,
/// attempt counting from 1). Only `ProcessError::Retryable` is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// # Arguments
    /// * `max_attempts` - Total attempts including the first (clamped to at least 1)
    /// * `base_delay` - Delay unit; attempt N waits `N * base_delay` before attempt N+1
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait after a rate-limited `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Decide what follows a failed `attempt` (1-based)
    pub fn decide(&self, attempt: u32, error: &ProcessError) -> RetryDecision {
        match error {
            ProcessError::Fatal(msg) => RetryDecision::GiveUp(msg.clone()),
            ProcessError::Retryable(msg) if attempt >= self.max_attempts => {
                RetryDecision::GiveUp(format!(
                    "retries exhausted after {} attempts: {}",
                    attempt, msg
                ))
            }
            ProcessError::Retryable(_) => RetryDecision::Retry(self.delay_for(attempt)),
        }
    }
}

/// Run `op` under `policy`, counting every attempt on the job row.
///
/// `op` receives the 1-based attempt number. The result is either the
/// operation's value or a `ProcessError::Fatal` carrying the last message.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    repo: &dyn JobRepository,
    job: &Job,
    mut op: F,
) -> Result<T, ProcessError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProcessError>>,
{
    let mut attempt: u32 = 1;
    loop {
        if let Err(e) = repo.record_attempt(&job.id).await {
            // attempt_count is observability only; the call itself proceeds
            warn!(job_id = %job.id, error = %e, "Failed to record attempt");
        }

        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match policy.decide(attempt, &error) {
            RetryDecision::Retry(delay) => {
                info!(
                    job_id = %job.id,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::GiveUp(msg) => {
                warn!(job_id = %job.id, attempt = attempt, error = %msg, "Giving up on item");
                return Err(ProcessError::Fatal(msg));
            }
        }
    }
}
