//! Injectable delays
//!
//! Every pause a worker takes (pacing, settling, retry and launch backoff,
//! readiness polling) goes through a [`Sleeper`], so tests can run the
//! whole state machine without waiting.

use crate::config::DelayRange;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Something that can wait
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delays on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Skips every delay; yields so other tasks still make progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Sleeper for NoDelay {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

impl DelayRange {
    /// Draws a uniformly distributed delay from the range
    pub fn sample(&self) -> Duration {
        let millis = if self.min_ms >= self.max_ms {
            self.min_ms
        } else {
            rand::rng().random_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Records requested delays without waiting
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn delays(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_range() {
        let range = DelayRange::new(2000, 4000);
        for _ in 0..200 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(2000));
            assert!(d <= Duration::from_millis(4000));
        }
    }

    #[test]
    fn test_sample_degenerate_range() {
        assert_eq!(DelayRange::new(1500, 1500).sample(), Duration::from_millis(1500));
        assert_eq!(DelayRange::zero().sample(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_no_delay_returns_immediately() {
        let start = std::time::Instant::now();
        NoDelay.sleep(Duration::from_secs(60)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
