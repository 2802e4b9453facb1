use std::fmt;

/// Lifecycle of one browser session
///
/// A session is owned by exactly one worker and never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserSessionState {
    /// Constructed, no browser process yet
    Uninitialized,

    /// Browser process is starting
    Launching,

    /// Idle and able to navigate
    Ready,

    /// A navigation is in flight
    Navigating,

    /// The browser crashed or was blocked; must be relaunched before reuse
    Faulted,

    /// All resources released
    Closed,
}

impl BrowserSessionState {
    /// Returns true if the session holds a live browser
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Ready | Self::Navigating)
    }

    /// Returns true if `open()` may be called from this state
    pub fn can_open(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Faulted | Self::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Launching => "launching",
            Self::Ready => "ready",
            Self::Navigating => "navigating",
            Self::Faulted => "faulted",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for BrowserSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
