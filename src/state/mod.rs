//! State module for tracking fetch progress
//!
//! # Components
//!
//! - `BrowserSessionState`: lifecycle of one worker's browser
//! - `FetchState`: per-page retry state machine
//! - `RetryContext`: attempt bookkeeping for one page
//! - `ErrorKind`: classification of a failed attempt

mod fetch_state;
mod retry;
mod session_state;

// Re-export main types
pub use fetch_state::{ErrorKind, FetchState};
pub use retry::{RetryContext, RetryDecision};
pub use session_state::BrowserSessionState;
