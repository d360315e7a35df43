//! Wall-clock abstraction
//!
//! Timestamps written to the store are milliseconds since the Unix epoch.
//! Timers always run on tokio time; [`TokioClock`] derives timestamps from
//! tokio time too, so paused-time tests see timestamps and timers advance
//! together.

use std::fmt::Debug;

/// Source of the current time in milliseconds since the epoch
pub trait Clock: Debug + Send + Sync {
    /// Current time
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by `chrono`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock anchored at a fixed epoch offset and advanced by tokio time
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin_ms: i64,
    started: tokio::time::Instant,
}

impl TokioClock {
    /// Start a clock reading `origin_ms` now
    pub fn starting_at(origin_ms: i64) -> Self {
        Self {
            origin_ms,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        self.origin_ms + self.started.elapsed().as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
