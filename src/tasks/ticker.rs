//! Periodic tick source shared by both countdown loops

use std::time::Duration;

use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};

/// Fires every `period`, plus once exactly at the run deadline so the
/// final tick is not up to a whole period late.
pub struct Ticker {
    interval: Interval,
    deadline: Option<Instant>,
}

impl Ticker {
    /// The first tick completes immediately.
    pub fn new(period: Duration, deadline: Instant) -> Self {
        let mut interval = interval(period);
        // A stalled process resumes with one tick, not a burst.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            deadline: Some(deadline),
        }
    }

    /// Wait for the next tick and return the instant the caller woke up.
    pub async fn tick(&mut self) -> Instant {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = sleep_until(deadline) => {
                        self.deadline = None;
                        Instant::now()
                    }
                    _ = self.interval.tick() => Instant::now(),
                }
            }
            None => {
                self.interval.tick().await;
                Instant::now()
            }
        }
    }
}
