//! # Fibonacci Backoff
//!
//! Progressive backoff that grows more slowly than exponential backoff, used
//! by the error policy to space out retries of a failing resource.
//!
//! Two tiers exist: the default tier for ordinary retryable failures, and the
//! "very slow" tier for failures that need a human, such as a management lock
//! on the resource group.
//!
//! ```rust
//! use arm_resource_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 1);
//! assert_eq!(backoff.next_backoff_seconds(), 1);
//! assert_eq!(backoff.next_backoff_seconds(), 2);
//! assert_eq!(backoff.next_backoff_seconds(), 3);
//! assert_eq!(backoff.next_backoff_seconds(), 5);
//! ```

use crate::conditions::RetryClassification;
use crate::config::ControllerConfig;
use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max_seconds`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibonacciBackoff {
    min_seconds: u64,
    prev_seconds: u64,
    current_seconds: u64,
    max_seconds: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        let min_seconds = min_seconds.max(1);
        Self {
            min_seconds,
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds: max_seconds.max(min_seconds),
        }
    }

    /// Backoff tier for an error's retry classification
    ///
    /// `None` means the error is not retried by the error policy; it still
    /// gets the default tier so a later manual requeue is spaced out.
    #[must_use]
    pub fn for_retry(retry: RetryClassification, config: &ControllerConfig) -> Self {
        match retry {
            RetryClassification::VerySlow => Self::new(
                config.very_slow_backoff_min_secs,
                config.very_slow_backoff_max_secs,
            ),
            RetryClassification::Fast | RetryClassification::None => {
                Self::new(config.retry_backoff_min_secs, config.retry_backoff_max_secs)
            }
        }
    }

    /// Get the next backoff in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;
        let next = self.prev_seconds.saturating_add(self.current_seconds);
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next, self.max_seconds);
        result
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_seconds = 0;
        self.current_seconds = self.min_seconds;
    }

    pub fn max_seconds(&self) -> u64 {
        self.max_seconds
    }
}
