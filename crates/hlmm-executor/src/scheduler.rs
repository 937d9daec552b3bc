//! Refresh and age-check timers.
//!
//! Both timers are polled by the engine task, so an age check never runs
//! concurrently with a refresh cycle. Missed ticks are skipped.

use std::time::Duration;

use hlmm_mm::MakerConfig;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Refresh,
    AgeCheck,
}

#[derive(Debug)]
pub struct Scheduler {
    refresh: Interval,
    age_check: Interval,
}

impl Scheduler {
    /// First ticks fire one period from now.
    pub fn new(refresh_every: Duration, age_check_every: Duration) -> Self {
        Self {
            refresh: skipping_interval(refresh_every),
            age_check: skipping_interval(age_check_every),
        }
    }

    pub fn from_config(config: &MakerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.refresh_interval_ms()),
            Duration::from_millis(config.age_check_interval_ms),
        )
    }

    /// Wait for the next tick. Refresh wins when both are due.
    pub async fn next(&mut self) -> Tick {
        tokio::select! {
            biased;
            _ = self.refresh.tick() => Tick::Refresh,
            _ = self.age_check.tick() => Tick::AgeCheck,
        }
    }
}

fn skipping_interval(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
