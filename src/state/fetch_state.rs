//! Per-page fetch state machine
//!
//! `Pending -> Fetching -> {Succeeded, Retrying, Failed}`, and
//! `Retrying -> {Fetching, Failed}`.
use crate::HarvestError;
use std::fmt;

/// Represents the current state of one page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    /// Task created, no attempt made yet
    Pending,

    /// An attempt is in flight
    Fetching,

    /// An attempt failed and another is scheduled
    Retrying,

    // ===== Terminal States =====
    /// Records (or a confirmed empty page) were extracted
    Succeeded,

    /// Retry budget exhausted; never retried again in the same run
    Failed,
}

impl FetchState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the machine may move from `self` to `next`
    pub fn can_transition_to(&self, next: FetchState) -> bool {
        use FetchState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Succeeded)
                | (Fetching, Retrying)
                | (Fetching, Failed)
                | (Retrying, Fetching)
                | (Retrying, Failed)
        )
    }

    /// Performs a checked transition
    pub fn transition(self, next: FetchState) -> Result<FetchState, HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HarvestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a fetch attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The browser could not be (re)launched
    Launch,

    /// Navigation did not complete within the page timeout
    NavigationTimeout,

    /// Navigation failed outright
    NavigationError,

    /// The readiness selector never appeared
    ReadinessTimeout,

    /// The engine served a bot wall instead of results
    Blocked,

    /// The browser process or its connection died
    Crashed,

    /// The page rendered but no result block could be recognized
    Unrecognized,
}

impl ErrorKind {
    /// Returns true if the session must be torn down and relaunched before
    /// the next attempt
    pub fn requires_relaunch(&self) -> bool {
        matches!(self, Self::Launch | Self::Blocked | Self::Crashed)
    }

    /// Returns true for timeouts, which reuse the live session
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NavigationTimeout | Self::ReadinessTimeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::NavigationTimeout => "navigation_timeout",
            Self::NavigationError => "navigation_error",
            Self::ReadinessTimeout => "readiness_timeout",
            Self::Blocked => "blocked",
            Self::Crashed => "crashed",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
