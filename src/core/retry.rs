//! Retry policy: requeue while budget remains, otherwise give up.

use crate::config::{BackoffStrategy, RetryConfig};
use crate::error::ProcessingError;
use crate::task::Task;
use std::time::Duration;

/// Outcome of a retry policy evaluation for a failed task.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Put this copy back at the tail of the queue after `delay`.
    Requeue {
        /// The task with its budget decremented
        task: Task,
        /// Wait before requeueing
        delay: Duration,
    },

    /// No budget left. Record the failure and do not requeue.
    Exhausted,
}

/// Decides what happens to a task whose attempt just failed.
///
/// A failure with a positive budget `r` requeues a copy carrying `r - 1`;
/// a failure with budget 0 is terminal. An initial budget of `r` therefore
/// allows `r + 1` attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy with the given backoff configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Decide what to do with `task` after it failed with `error`.
    ///
    /// `task` itself is left untouched.
    pub fn decide(&self, task: &Task, error: &ProcessingError) -> RetryDecision {
        match task.next_attempt() {
            Some(next) => {
                tracing::debug!(
                    "Task '{}' failed ({}), requeueing with {} retries left",
                    task.task_type,
                    error,
                    next.retries
                );
                let delay = self.delay_for(next.attempts);
                RetryDecision::Requeue { task: next, delay }
            }
            None => RetryDecision::Exhausted,
        }
    }

    /// Backoff before retrying after the `failures`-th failed attempt.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let base = self.config.base_delay_ms;
        let step = failures.saturating_sub(1).min(32);

        let delay_ms = match &self.config.backoff {
            BackoffStrategy::None => return Duration::ZERO,
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear { increment_ms } => {
                base.saturating_add(increment_ms.saturating_mul(u64::from(step)))
            }
            BackoffStrategy::Exponential { multiplier } => {
                let factor = multiplier.max(1.0).powi(step as i32);
                (base as f64 * factor).min(u64::MAX as f64) as u64
            }
        };

        Duration::from_millis(delay_ms.min(self.config.max_delay_ms))
    }
}
