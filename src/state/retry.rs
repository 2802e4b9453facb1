use crate::state::ErrorKind;
use std::time::Duration;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then attempt again
    Retry { delay: Duration },
    /// The budget is spent
    Exhausted,
}

/// Attempt bookkeeping for one page
///
/// Lives for the attempt sequence of a single task and is discarded on
/// success or exhaustion. `max_attempts` counts every attempt, the first
/// one included.
#[derive(Debug, Clone)]
pub struct RetryContext {
    attempt_count: u32,
    max_attempts: u32,
    last_error_kind: Option<ErrorKind>,
    backoff: Duration,
}

impl RetryContext {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            last_error_kind: None,
            backoff,
        }
    }

    /// Starts an attempt and returns its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    /// Records a failed attempt and decides whether to go again
    pub fn record_failure(&mut self, kind: ErrorKind) -> RetryDecision {
        self.last_error_kind = Some(kind);
        if self.attempt_count >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry {
                delay: self.backoff,
            }
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        self.last_error_kind
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}
