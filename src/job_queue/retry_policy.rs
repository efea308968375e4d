//! Retry policy for failed jobs.
//!
//! Exponential backoff: `base × 2^attempt`, where `attempt` is the 0-based
//! index of the attempt that just failed.

use super::handler::JobError;
use super::models::QueuedJob;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Cap for exponential growth.
    pub max_backoff: Duration,
}

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Bury,
}

impl RetryPolicy {
    pub fn new(max_backoff: Duration) -> Self {
        Self { max_backoff }
    }

    pub fn backoff(&self, base: Duration, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        base.checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Decide the fate of `job` whose current attempt failed with `error`.
    pub fn decide(&self, job: &QueuedJob, error: &JobError) -> RetryDecision {
        let attempts_after_failure = job.attempts_made + 1;
        if error.is_retryable() && attempts_after_failure < job.max_attempts {
            RetryDecision::RetryAfter(self.backoff(job.backoff_base(), job.attempts_made))
        } else {
            RetryDecision::Bury
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_backoff: Duration::from_secs(15 * 60),
        }
    }
}
